//! Mirror building blocks: the remote property enum, ordered schemas and the
//! open factory registry that turns sync descriptions into mirror nodes.
//!
//! # How a sync description becomes a mirror (for beginners)
//!
//! ```text
//! {"counter": {"_type": "variable", ...}, "point": {"_type": "object", ...}}
//!        │                                        │
//!        ▼ factories["variable"]                  ▼ factories["object"]
//!   RemoteVariable                           RemoteObject ── nested scope ──┐
//!                                                 ▲                          │
//!                                                 └── deserialize_schema ◄───┘
//! ```
//!
//! The registry is keyed by the `_type` tag, so a new property kind only
//! needs a new factory; the dispatcher never changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ptl_core::protocol::sync::{METHOD_TAG, OBJECT_TAG, VARIABLE_TAG};
use ptl_core::{PropertySync, PtlError, SchemaSync, TypeRegistry};
use serde_json::{Map, Value};

use super::error::{ClientError, ClientResult};
use super::link::Link;
use super::remote_method::RemoteMethod;
use super::remote_object::RemoteObject;
use super::remote_variable::RemoteVariable;

// ── RemoteProperty ────────────────────────────────────────────────────────────

/// One node of the mirror.
#[derive(Debug, Clone)]
pub enum RemoteProperty {
    Variable(RemoteVariable),
    Method(RemoteMethod),
    Object(RemoteObject),
}

impl RemoteProperty {
    pub fn name(&self) -> &str {
        match self {
            Self::Variable(v) => v.name(),
            Self::Method(m) => m.name(),
            Self::Object(o) => o.name(),
        }
    }

    /// Dotted path inside the owning layer.
    pub fn full_name(&self) -> &str {
        match self {
            Self::Variable(v) => v.full_name(),
            Self::Method(m) => m.full_name(),
            Self::Object(o) => o.full_name(),
        }
    }

    pub fn as_variable(&self) -> Option<&RemoteVariable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&RemoteMethod> {
        match self {
            Self::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Replaces the cached value with one received in a patch.
    ///
    /// # Errors
    ///
    /// [`PtlError::Type`] for methods and for object values that lack a
    /// field.
    pub fn apply_patch(&self, value: Value) -> ClientResult<()> {
        match self {
            Self::Variable(v) => {
                v.apply_patch(value);
                Ok(())
            }
            Self::Object(o) => o.apply_patch(value),
            Self::Method(m) => m.apply_patch(value),
        }
    }

    /// Cached value for display purposes; `null` when not readable.
    pub fn snapshot(&self) -> Value {
        match self {
            Self::Variable(v) => v.get().unwrap_or(Value::Null),
            Self::Object(o) => o.get().unwrap_or(Value::Null),
            Self::Method(m) => Value::String(m.to_string()),
        }
    }
}

impl fmt::Display for RemoteProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(v) => fmt::Display::fmt(v, f),
            Self::Method(m) => fmt::Display::fmt(m, f),
            Self::Object(o) => fmt::Display::fmt(o, f),
        }
    }
}

impl From<RemoteVariable> for RemoteProperty {
    fn from(v: RemoteVariable) -> Self {
        Self::Variable(v)
    }
}

impl From<RemoteMethod> for RemoteProperty {
    fn from(m: RemoteMethod) -> Self {
        Self::Method(m)
    }
}

impl From<RemoteObject> for RemoteProperty {
    fn from(o: RemoteObject) -> Self {
        Self::Object(o)
    }
}

// ── RemoteSchema ──────────────────────────────────────────────────────────────

/// Mirror nodes in sync order, with name lookup.
#[derive(Debug, Clone, Default)]
pub struct RemoteSchema {
    entries: Vec<RemoteProperty>,
    index: HashMap<String, usize>,
}

impl RemoteSchema {
    pub fn get(&self, name: &str) -> Option<&RemoteProperty> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RemoteProperty> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(RemoteProperty::name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached values of every variable and object.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .filter(|p| p.as_method().is_none())
            .map(|p| (p.name().to_string(), p.snapshot()))
            .collect();
        Value::Object(map)
    }

    /// Checks that `value` carries every variable and object field, then
    /// writes them. Nothing is written if a field is missing.
    pub(crate) fn apply_object_value(&self, owner: &str, value: Value) -> ClientResult<()> {
        self.check_object_value(owner, &value)?;
        let Value::Object(mut fields) = value else {
            return Ok(());
        };
        for property in self.iter().filter(|p| p.as_method().is_none()) {
            if let Some(field) = fields.remove(property.name()) {
                property.apply_patch(field)?;
            }
        }
        Ok(())
    }

    fn check_object_value(&self, owner: &str, value: &Value) -> ClientResult<()> {
        let Value::Object(fields) = value else {
            return Err(PtlError::Type(format!(
                "Cannot set value for {owner}: expected Object, got {}",
                ptl_core::typename(Some(value))
            ))
            .into());
        };
        for property in self.iter() {
            let field = fields.get(property.name());
            match (property, field) {
                (RemoteProperty::Method(_), _) => {}
                (_, None) => {
                    return Err(PtlError::Type(format!(
                        "Cannot set value for {owner}: new value lacks {} property",
                        property.name()
                    ))
                    .into())
                }
                (RemoteProperty::Object(o), Some(nested)) => {
                    o.schema().check_object_value(o.full_name(), nested)?
                }
                (RemoteProperty::Variable(_), Some(_)) => {}
            }
        }
        Ok(())
    }
}

impl FromIterator<RemoteProperty> for RemoteSchema {
    fn from_iter<I: IntoIterator<Item = RemoteProperty>>(iter: I) -> Self {
        let mut schema = Self::default();
        for property in iter {
            match schema.index.get(property.name()) {
                Some(&i) => schema.entries[i] = property,
                None => {
                    schema
                        .index
                        .insert(property.name().to_string(), schema.entries.len());
                    schema.entries.push(property);
                }
            }
        }
        schema
    }
}

impl<'a> IntoIterator for &'a RemoteSchema {
    type Item = &'a RemoteProperty;
    type IntoIter = std::slice::Iter<'a, RemoteProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Factories ─────────────────────────────────────────────────────────────────

/// Builds a mirror node from its sync description.
pub type PropertyFactory =
    Arc<dyn Fn(&MirrorScope<'_>, &PropertySync) -> ClientResult<RemoteProperty> + Send + Sync>;

/// `_type` tag → factory.
#[derive(Clone)]
pub struct PropertyFactories {
    factories: HashMap<String, PropertyFactory>,
}

impl Default for PropertyFactories {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PropertyFactories {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the `variable`, `method` and `object` factories.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(VARIABLE_TAG, |scope, sync| {
            RemoteVariable::from_sync(scope, sync).map(RemoteProperty::from)
        });
        registry.register(METHOD_TAG, |scope, sync| {
            Ok(RemoteMethod::from_sync(scope, sync).into())
        });
        registry.register(OBJECT_TAG, |scope, sync| {
            RemoteObject::from_sync(scope, sync).map(RemoteProperty::from)
        });
        registry
    }

    /// Adds (or replaces) the factory for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&MirrorScope<'_>, &PropertySync) -> ClientResult<RemoteProperty> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    pub fn get(&self, tag: &str) -> Option<&PropertyFactory> {
        self.factories.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }
}

impl fmt::Debug for PropertyFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

// ── MirrorScope ───────────────────────────────────────────────────────────────

/// Everything a factory needs to build a node at one position of the tree.
#[derive(Clone, Copy)]
pub struct MirrorScope<'a> {
    /// Owning layer.
    pub layer: &'a str,
    /// Dotted path of the enclosing object, if any.
    pub parent: Option<&'a str>,
    pub types: &'a TypeRegistry,
    pub factories: &'a PropertyFactories,
    pub link: &'a Link,
}

impl<'a> MirrorScope<'a> {
    pub fn new(
        layer: &'a str,
        types: &'a TypeRegistry,
        factories: &'a PropertyFactories,
        link: &'a Link,
    ) -> Self {
        Self {
            layer,
            parent: None,
            types,
            factories,
            link,
        }
    }

    /// Dotted path of a child called `name` in this scope.
    pub fn path_of(&self, name: &str) -> String {
        match self.parent {
            Some(parent) => format!("{parent}.{name}"),
            None => name.to_string(),
        }
    }

    /// Scope for the children of the object at `path`.
    pub fn nested<'b>(&self, path: &'b str) -> MirrorScope<'b>
    where
        'a: 'b,
    {
        MirrorScope {
            layer: self.layer,
            parent: Some(path),
            types: self.types,
            factories: self.factories,
            link: self.link,
        }
    }

    /// Builds one node per entry of `schema`, dispatching on `_type`.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownPropertyKind`] for unregistered tags, plus
    /// whatever the factories report.
    pub fn deserialize_schema(&self, schema: &SchemaSync) -> ClientResult<RemoteSchema> {
        schema
            .iter()
            .map(|sync| {
                let factory = self
                    .factories
                    .get(&sync.kind)
                    .ok_or_else(|| ClientError::UnknownPropertyKind(sync.kind.clone()))?;
                factory(self, sync)
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
