//! Mirror of a server object variable.
//!
//! The object keeps no value of its own: reading composes the cached values
//! of its children and writing (or patching) decomposes a value into them.
//! A value missing one of the children is rejected as a whole.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use ptl_core::{Action, Allow, PropertySync, PtlError, SchemaSync};
use serde_json::Value;

use super::error::ClientResult;
use super::link::Link;
use super::remote_schema::{MirrorScope, RemoteProperty, RemoteSchema};

#[derive(Debug, Clone)]
pub struct RemoteObject {
    layer: String,
    path: String,
    name: String,
    allow: Allow,
    schema: Arc<RemoteSchema>,
    link: Link,
}

impl RemoteObject {
    /// Builds the object and, recursively, its children.
    ///
    /// # Errors
    ///
    /// Whatever building a child fails with.
    pub fn from_sync(scope: &MirrorScope<'_>, sync: &PropertySync) -> ClientResult<Self> {
        let path = scope.path_of(&sync.name);
        let empty = SchemaSync::default();
        let children = sync.schema.as_ref().unwrap_or(&empty);
        let schema = scope.nested(&path).deserialize_schema(children)?;
        Ok(Self {
            layer: scope.layer.to_string(),
            name: sync.name.clone(),
            allow: sync.allow,
            schema: Arc::new(schema),
            link: scope.link.clone(),
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.path
    }

    pub fn allow(&self) -> Allow {
        self.allow
    }

    pub fn schema(&self) -> &RemoteSchema {
        &self.schema
    }

    /// Child at a dotted path relative to this object.
    pub fn get_property(&self, path: &str) -> Option<&RemoteProperty> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let child = self.schema.get(head)?;
        match rest {
            None => Some(child),
            Some(rest) => child.as_object()?.get_property(rest),
        }
    }

    /// Composed value of the children.
    ///
    /// # Errors
    ///
    /// [`PtlError::IllegalAccess`] when the object is not readable.
    pub fn get(&self) -> ClientResult<Value> {
        if !self.allow.r {
            return Err(PtlError::IllegalAccess(format!(
                "Property {} is not readable",
                self.path
            ))
            .into());
        }
        Ok(self.schema.to_value())
    }

    /// Whether `value` is an object carrying exactly the child fields, each
    /// passing its child's check.
    pub fn typecheck(&self, value: &Value) -> bool {
        let Value::Object(fields) = value else {
            return false;
        };
        let children: Vec<&RemoteProperty> = self
            .schema
            .iter()
            .filter(|p| p.as_method().is_none())
            .collect();
        fields.len() == children.len()
            && children.iter().all(|child| match (child, fields.get(child.name())) {
                (RemoteProperty::Variable(v), Some(field)) => v.typecheck(field),
                (RemoteProperty::Object(o), Some(field)) => o.typecheck(field),
                _ => false,
            })
    }

    /// Queues a `set` of the whole object; the answer is spread over the
    /// children.
    ///
    /// Rejects immediately when the object is not writable or `value` does
    /// not match its shape.
    pub fn set(&self, value: Value) -> BoxFuture<'static, ClientResult<Value>> {
        if !self.allow.w {
            let err = PtlError::IllegalAccess(format!("Property \"{}\" is not writable", self.path));
            return future::ready(Err(err.into())).boxed();
        }
        if !self.typecheck(&value) {
            let err = PtlError::Type(format!(
                "Cannot set value for {}: the value does not match the object's fields",
                self.path
            ));
            return future::ready(Err(err.into())).boxed();
        }
        self.round_trip(Action::set(self.target(), value))
    }

    /// Queues a `get` and spreads the answer over the children.
    pub fn sync(&self) -> BoxFuture<'static, ClientResult<Value>> {
        self.round_trip(Action::get(self.target()))
    }

    /// Spreads a patched value over the children, all or nothing.
    ///
    /// # Errors
    ///
    /// [`PtlError::Type`] when a child field is missing.
    pub fn apply_patch(&self, value: Value) -> ClientResult<()> {
        self.schema.apply_object_value(&self.path, value)
    }

    fn round_trip(&self, action: Action) -> BoxFuture<'static, ClientResult<Value>> {
        let reply = self.link.request(action);
        let schema = Arc::clone(&self.schema);
        let path = self.path.clone();
        async move {
            let value = reply.await?;
            if !value.is_null() {
                schema.apply_object_value(&path, value.clone())?;
            }
            Ok(value)
        }
        .boxed()
    }

    fn target(&self) -> String {
        format!("{}/{}", self.layer, self.path)
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlRemoteObject \"{}\"]", self.path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
