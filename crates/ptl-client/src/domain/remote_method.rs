//! Mirror of a server method.

use std::fmt;

use futures_util::future::BoxFuture;
use ptl_core::{Action, PropertySync, PtlError};
use serde_json::Value;

use super::error::ClientResult;
use super::link::Link;
use super::remote_schema::MirrorScope;

/// Calling it queues a `call` action for the server-side method.
#[derive(Debug, Clone)]
pub struct RemoteMethod {
    layer: String,
    path: String,
    name: String,
    is_arrow: bool,
    is_contextual: bool,
    link: Link,
}

impl RemoteMethod {
    pub fn from_sync(scope: &MirrorScope<'_>, sync: &PropertySync) -> Self {
        Self {
            layer: scope.layer.to_string(),
            path: scope.path_of(&sync.name),
            name: sync.name.clone(),
            is_arrow: sync.is_arrow.unwrap_or(false),
            is_contextual: sync.is_contextual.unwrap_or(false),
            link: scope.link.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.path
    }

    pub fn is_arrow(&self) -> bool {
        self.is_arrow
    }

    pub fn is_contextual(&self) -> bool {
        self.is_contextual
    }

    /// Queues the call; the future resolves with the method's return value.
    pub fn call(&self, args: Vec<Value>) -> BoxFuture<'static, ClientResult<Value>> {
        self.link
            .request(Action::call(format!("{}/{}", self.layer, self.path), args))
    }

    /// Methods carry no value, so patching one is always an error.
    pub fn apply_patch(&self, _value: Value) -> ClientResult<()> {
        Err(PtlError::Type(format!("A patch cannot be applied to method {self}")).into())
    }
}

impl fmt::Display for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlRemoteMethod \"{}\"]", self.path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
