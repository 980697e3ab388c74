//! Mirror of a server variable.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use ptl_core::types::assign_error;
use ptl_core::{Action, Allow, PropertySync, PtlError, VarType};
use serde_json::Value;

use super::error::{ClientError, ClientResult};
use super::link::Link;
use super::remote_schema::MirrorScope;

/// Cached copy of a server variable plus the operations that round-trip to
/// it.
///
/// Permission and type checks run locally first, so actions the server
/// would refuse are rejected without a request. The server still enforces
/// them on its side.
#[derive(Debug, Clone)]
pub struct RemoteVariable {
    layer: String,
    path: String,
    name: String,
    ty: VarType,
    nullable: bool,
    allow: Allow,
    cache: Arc<Mutex<Value>>,
    link: Link,
}

impl RemoteVariable {
    /// Builds the mirror of a synced variable.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownType`] when `T` is missing from the client's
    /// type registry.
    pub fn from_sync(scope: &MirrorScope<'_>, sync: &PropertySync) -> ClientResult<Self> {
        let type_name = sync.type_name.as_deref().unwrap_or("undefined");
        let ty = scope
            .types
            .resolve(type_name)
            .ok_or_else(|| ClientError::UnknownType {
                variable: sync.name.clone(),
                type_name: type_name.to_string(),
            })?;
        Ok(Self {
            layer: scope.layer.to_string(),
            path: scope.path_of(&sync.name),
            name: sync.name.clone(),
            ty,
            nullable: sync.nullable.unwrap_or(false),
            allow: sync.allow,
            cache: Arc::new(Mutex::new(sync.value.clone())),
            link: scope.link.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path inside the layer, e.g. `point.x`.
    pub fn full_name(&self) -> &str {
        &self.path
    }

    pub fn layer_name(&self) -> &str {
        &self.layer
    }

    pub fn allow(&self) -> Allow {
        self.allow
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn var_type(&self) -> &VarType {
        &self.ty
    }

    /// Whether `value` may be assigned: `null` iff nullable, otherwise the
    /// declared type decides.
    pub fn typecheck(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.ty.accepts(value)
        }
    }

    /// The cached value.
    ///
    /// # Errors
    ///
    /// [`PtlError::IllegalAccess`] when the variable is not readable.
    pub fn get(&self) -> ClientResult<Value> {
        if !self.allow.r {
            return Err(PtlError::IllegalAccess(format!(
                "Property {} is not readable",
                self.path
            ))
            .into());
        }
        Ok(self.cache.lock().clone())
    }

    /// Queues a `set` action and resolves with the value the server stored.
    ///
    /// Rejects immediately, without queueing anything, when the variable is
    /// not writable or `value` fails the type check.
    pub fn set(&self, value: Value) -> BoxFuture<'static, ClientResult<Value>> {
        if !self.allow.w {
            let err = PtlError::IllegalAccess(format!("Property \"{}\" is not writable", self.path));
            return future::ready(Err(err.into())).boxed();
        }
        if !self.typecheck(&value) {
            let err = assign_error(&self.path, self.ty.name(), Some(&value));
            return future::ready(Err(err.into())).boxed();
        }
        let reply = self.link.request(Action::set(self.target(), value));
        let cache = Arc::clone(&self.cache);
        async move {
            let stored = reply.await?;
            *cache.lock() = stored.clone();
            Ok(stored)
        }
        .boxed()
    }

    /// Queues a `get` action and refreshes the cache with the answer.
    pub fn sync(&self) -> BoxFuture<'static, ClientResult<Value>> {
        let reply = self.link.request(Action::get(self.target()));
        let cache = Arc::clone(&self.cache);
        async move {
            let value = reply.await?;
            *cache.lock() = value.clone();
            Ok(value)
        }
        .boxed()
    }

    pub fn apply_patch(&self, value: Value) {
        *self.cache.lock() = value;
    }

    fn target(&self) -> String {
        format!("{}/{}", self.layer, self.path)
    }
}

impl fmt::Display for RemoteVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlRemoteVariable \"{}\"]", self.path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
