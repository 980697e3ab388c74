//! Mirror of a whole server layer.

use std::fmt;

use ptl_core::{LayerPatch, LayerSync, PtlError, TypeRegistry};
use serde_json::Value;

use super::error::ClientResult;
use super::link::Link;
use super::remote_method::RemoteMethod;
use super::remote_object::RemoteObject;
use super::remote_schema::{MirrorScope, PropertyFactories, RemoteProperty, RemoteSchema};
use super::remote_variable::RemoteVariable;

/// The client-side reconstruction of one layer, as of the last sync.
#[derive(Debug, Clone)]
pub struct RemoteLayer {
    name: String,
    schema: RemoteSchema,
}

impl RemoteLayer {
    /// Builds the mirror from a layer's sync description.
    ///
    /// # Errors
    ///
    /// Unknown property tags and unknown variable types.
    pub fn from_sync(
        sync: &LayerSync,
        types: &TypeRegistry,
        factories: &PropertyFactories,
        link: &Link,
    ) -> ClientResult<Self> {
        let scope = MirrorScope::new(&sync.name, types, factories, link);
        Ok(Self {
            name: sync.name.clone(),
            schema: scope.deserialize_schema(&sync.schema)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &RemoteSchema {
        &self.schema
    }

    /// Resolves a dotted path such as `"point.x"`.
    ///
    /// # Errors
    ///
    /// [`PtlError::NotFound`] naming the full path.
    pub fn get_property(&self, path: &str) -> ClientResult<&RemoteProperty> {
        let missing = || PtlError::NotFound(format!("Path \"{path}\" does not exist on {self}"));
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let property = self.schema.get(head).ok_or_else(missing)?;
        match rest {
            None => Ok(property),
            Some(rest) => property
                .as_object()
                .and_then(|o| o.get_property(rest))
                .ok_or_else(|| missing().into()),
        }
    }

    /// # Errors
    ///
    /// Not found, or [`PtlError::Type`] when the path names another kind.
    pub fn variable(&self, path: &str) -> ClientResult<&RemoteVariable> {
        let property = self.get_property(path)?;
        property
            .as_variable()
            .ok_or_else(|| PtlError::Type(format!("{property} is not a variable")).into())
    }

    /// # Errors
    ///
    /// Not found, or [`PtlError::Type`] when the path names another kind.
    pub fn method(&self, path: &str) -> ClientResult<&RemoteMethod> {
        let property = self.get_property(path)?;
        property
            .as_method()
            .ok_or_else(|| PtlError::Type(format!("{property} is not a method")).into())
    }

    /// # Errors
    ///
    /// Not found, or [`PtlError::Type`] when the path names another kind.
    pub fn object(&self, path: &str) -> ClientResult<&RemoteObject> {
        let property = self.get_property(path)?;
        property
            .as_object()
            .ok_or_else(|| PtlError::Type(format!("{property} is not an object")).into())
    }

    /// Applies one layer's entry of a response patch.
    ///
    /// # Errors
    ///
    /// [`PtlError::NotFound`] for unknown names and [`PtlError::Type`] for
    /// methods. Entries before the failing one stay applied.
    pub fn apply_patch(&self, patch: &LayerPatch) -> ClientResult<()> {
        for (name, value) in patch {
            let property = self.schema.get(name).ok_or_else(|| {
                PtlError::NotFound(format!(
                    "Cannot apply patch for {self}: unknown property \"{name}\""
                ))
            })?;
            property.apply_patch(value.clone())?;
        }
        Ok(())
    }

    /// Cached values of readable variables and objects; methods are listed
    /// by their display name.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.schema
                .iter()
                .map(|p| (p.name().to_string(), p.snapshot()))
                .collect(),
        )
    }
}

impl fmt::Display for RemoteLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlRemoteLayer \"{}\"]", self.name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
