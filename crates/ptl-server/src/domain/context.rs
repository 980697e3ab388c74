//! Per-batch request context.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Context of one batch, shared by hooks and contextual methods.
///
/// `data` is the client's `ctx` as received (hooks may enrich it, e.g. with
/// the roles of the session).  [`RequestContext::send`] merges fields into
/// the context returned to the client, which stores them for later batches.
/// Clones share the same response context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub data: Value,
    response: Arc<Mutex<Map<String, Value>>>,
}

impl RequestContext {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            response: Arc::default(),
        }
    }

    /// Merges `fields` into the response context; later calls win.
    pub fn send(&self, fields: Map<String, Value>) {
        self.response.lock().extend(fields);
    }

    /// Shortcut for a single field.
    pub fn send_field(&self, key: impl Into<String>, value: Value) {
        self.response.lock().insert(key.into(), value);
    }

    /// Snapshot of everything sent so far.
    pub fn response(&self) -> Map<String, Value> {
        self.response.lock().clone()
    }
}
