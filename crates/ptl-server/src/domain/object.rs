//! Object variables: a variable whose value is a nested property tree.
//!
//! The value of an object is composed from its children on read and
//! decomposed into them on write.  A write must name every visible child and
//! is checked as a whole before any child is touched, so a rejected write
//! never leaves the object half-updated.

use std::sync::Arc;

use ptl_core::protocol::OBJECT_TAG;
use ptl_core::types::assign_error;
use ptl_core::{Allow, PropertySync, PtlError, PtlResult, SchemaSync};
use serde_json::{Map, Value};

use super::property::{Property, PropertyCore, PropertyOps, Schema};

/// Type name synced in the `T` field of objects.
const OBJECT_TYPE: &str = "Object";

#[derive(Debug)]
pub struct Object {
    core: PropertyCore,
    schema: Arc<Schema>,
    volatile: bool,
}

impl Object {
    pub fn new(schema: Schema) -> Self {
        Self {
            core: PropertyCore::new(Value::Null, Allow::READ_WRITE),
            schema: Arc::new(schema),
            volatile: false,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.core.set_allow(Allow::READ_ONLY);
        self
    }

    pub fn writeonly(mut self) -> Self {
        self.core.set_allow(Allow::WRITE_ONLY);
        self
    }

    pub fn allow(mut self, allow: Allow) -> Self {
        self.core.set_allow(allow);
        self
    }

    /// # Errors
    ///
    /// [`PtlError::Type`] if the object is already volatile.
    pub fn internal(mut self) -> PtlResult<Self> {
        if self.volatile {
            return Err(PtlError::Type(
                "Volatile variable should not be marked as internal".into(),
            ));
        }
        self.core.set_internal();
        Ok(self)
    }

    /// # Errors
    ///
    /// [`PtlError::Type`] if the object is already internal.
    pub fn volatile(mut self) -> PtlResult<Self> {
        if self.core.is_internal() {
            return Err(PtlError::Type(
                "Internal variable should not be marked as volatile".into(),
            ));
        }
        self.volatile = true;
        Ok(self)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub(crate) fn core(&self) -> &PropertyCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut PropertyCore {
        &mut self.core
    }

    /// Decomposes a checked value into the visible children.
    pub(crate) fn store_fields(&self, value: Value) {
        let Value::Object(mut map) = value else {
            return;
        };
        for child in self.visible_children() {
            if let Some(v) = map.remove(child.name()) {
                child.store_value(v);
            }
        }
        self.core.mark_changed();
    }

    fn visible_children(&self) -> impl Iterator<Item = &Property> {
        self.schema.iter().filter(|p| !p.is_internal())
    }

    /// Checks the whole assignment before anything is stored.
    fn check_assignment<'a>(&self, value: Option<&'a Value>) -> PtlResult<&'a Map<String, Value>> {
        let type_error = || assign_error(self.name(), OBJECT_TYPE, value);
        let map = match value {
            Some(Value::Object(map)) if self.typecheck(value) => map,
            _ => return Err(type_error()),
        };
        for child in self.visible_children() {
            if !child.allow().w {
                return Err(PtlError::IllegalAccess(format!(
                    "{}.{} is not writeable",
                    self.name(),
                    child.name()
                )));
            }
            if let Some(nested) = child.as_object() {
                nested.check_assignment(map.get(child.name()))?;
            }
        }
        Ok(map)
    }
}

impl PropertyOps for Object {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn allow(&self) -> Allow {
        self.core.allow()
    }

    fn is_internal(&self) -> bool {
        self.core.is_internal()
    }

    /// Exactly the visible child names, each passing its own check.
    fn typecheck(&self, value: Option<&Value>) -> bool {
        let Some(Value::Object(map)) = value else {
            return false;
        };
        let expected = self.visible_children().count();
        map.len() == expected
            && map.iter().all(|(key, v)| match self.schema.get(key) {
                Some(child) if !child.is_internal() => child.typecheck(Some(v)),
                _ => false,
            })
    }

    fn read(&self) -> PtlResult<Value> {
        self.core.ensure_readable()?;
        let mut map = Map::new();
        for child in self.visible_children() {
            map.insert(child.name().to_string(), child.read()?);
        }
        Ok(Value::Object(map))
    }

    fn write(&self, value: Option<Value>) -> PtlResult<()> {
        self.core.ensure_writable()?;
        self.check_assignment(value.as_ref())?;
        if let Some(value) = value {
            self.store_fields(value);
        }
        Ok(())
    }

    fn sync(&self) -> PropertySync {
        let mut sync = PropertySync::new(OBJECT_TAG, self.name(), self.visible_value(), self.allow());
        sync.nullable = Some(false);
        sync.volatile = Some(self.volatile);
        sync.type_name = Some(OBJECT_TYPE.to_string());
        sync.schema = Some(self.visible_children().map(|p| p.sync()).collect::<SchemaSync>());
        sync
    }

    fn visible_value(&self) -> Value {
        if !self.allow().r {
            return Value::Null;
        }
        let map = self
            .visible_children()
            .map(|p| (p.name().to_string(), p.visible_value()))
            .collect();
        Value::Object(map)
    }

    fn start_watch(&self) {
        self.core.start_watch();
        self.schema.iter().for_each(PropertyOps::start_watch);
    }

    fn check_changes(&self) -> bool {
        if self.core.is_hidden() {
            return false;
        }
        self.volatile || self.core.changed() || self.schema.iter().any(PropertyOps::check_changes)
    }

    fn end_watch(&self) {
        self.core.end_watch();
        self.schema.iter().for_each(PropertyOps::end_watch);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
