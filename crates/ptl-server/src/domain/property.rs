//! The property contract shared by variables, methods and objects.
//!
//! # How properties are modelled (for beginners)
//!
//! A layer exposes three kinds of things: plain *variables*, callable
//! *methods*, and *objects* (variables whose value is a nested tree of
//! properties).  They all share one small capability set, the
//! [`PropertyOps`] trait:
//!
//! - `read` / `write`, gated by the `allow` flags and the type check,
//! - `sync`, the description a client rebuilds its mirror from,
//! - the watch triplet `start_watch` / `check_changes` / `end_watch` used to
//!   compute the patch of a batch.
//!
//! The set of kinds is closed, so [`Property`] is a plain enum that forwards
//! every call to its variant.  State that every kind carries (name, flags,
//! the current value and the two watch bits) lives in [`PropertyCore`].
//!
//! Values are guarded per property by a `parking_lot::Mutex`; layers are
//! shared between concurrent batches and there is no isolation beyond that.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use ptl_core::{Allow, PropertySync, PtlError, PtlResult};
use serde_json::Value;

use super::method::Method;
use super::object::Object;
use super::variable::Variable;

/// Capabilities every property kind provides.
pub trait PropertyOps {
    /// Name assigned by the owning layer or object.
    fn name(&self) -> &str;

    fn allow(&self) -> Allow;

    /// Internal properties are never synced nor patched.
    fn is_internal(&self) -> bool;

    /// Whether `value` may be assigned.  `None` stands for an absent value.
    fn typecheck(&self, value: Option<&Value>) -> bool;

    /// The value as seen by a client.
    ///
    /// # Errors
    ///
    /// [`PtlError::IllegalAccess`] when the property is not readable.
    fn read(&self) -> PtlResult<Value>;

    /// Assigns a new value.
    ///
    /// # Errors
    ///
    /// [`PtlError::IllegalAccess`] when the property is not writable and
    /// [`PtlError::Type`] when `value` fails [`PropertyOps::typecheck`].
    /// Nothing is stored on failure.
    fn write(&self, value: Option<Value>) -> PtlResult<()>;

    fn sync(&self) -> PropertySync;

    /// Value to put in a patch or a sync description: `null` when unreadable.
    fn visible_value(&self) -> Value;

    fn start_watch(&self);

    fn check_changes(&self) -> bool;

    fn end_watch(&self);
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    value: Value,
    watching: bool,
    changed: bool,
}

/// Name, flags, value and watch bits common to all property kinds.
#[derive(Debug)]
pub struct PropertyCore {
    name: String,
    internal: bool,
    allow: Allow,
    state: Mutex<Slot>,
}

impl PropertyCore {
    pub(crate) fn new(value: Value, allow: Allow) -> Self {
        Self {
            name: String::new(),
            internal: false,
            allow,
            state: Mutex::new(Slot {
                value,
                watching: false,
                changed: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn allow(&self) -> Allow {
        self.allow
    }

    pub(crate) fn set_allow(&mut self, allow: Allow) {
        self.allow = allow;
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn set_internal(&mut self) {
        self.internal = true;
    }

    /// Hidden properties never show up in a patch.
    pub(crate) fn is_hidden(&self) -> bool {
        self.internal || !self.allow.r
    }

    /// Current value, ignoring permissions.
    pub(crate) fn load(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Replaces the value, ignoring permissions, and marks it changed.
    pub(crate) fn store(&self, value: Value) {
        let mut slot = self.state.lock();
        slot.value = value;
        slot.changed = true;
    }

    /// Mutates the value in place and marks it changed.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut slot = self.state.lock();
        slot.changed = true;
        f(&mut slot.value)
    }

    pub(crate) fn mark_changed(&self) {
        self.state.lock().changed = true;
    }

    pub(crate) fn changed(&self) -> bool {
        self.state.lock().changed
    }

    pub(crate) fn ensure_readable(&self) -> PtlResult<()> {
        if self.allow.r {
            Ok(())
        } else {
            Err(PtlError::IllegalAccess(format!("{} is not readable", self.name)))
        }
    }

    pub(crate) fn ensure_writable(&self) -> PtlResult<()> {
        if self.allow.w {
            Ok(())
        } else {
            Err(PtlError::IllegalAccess(format!("{} is not writeable", self.name)))
        }
    }

    /// Resets `changed` unless a watch window is already open.
    pub(crate) fn start_watch(&self) {
        let mut slot = self.state.lock();
        if !slot.watching {
            slot.changed = false;
            slot.watching = true;
        }
    }

    pub(crate) fn end_watch(&self) {
        self.state.lock().watching = false;
    }
}

// ── Property ──────────────────────────────────────────────────────────────────

/// Any property a layer or an object can hold.
#[derive(Debug)]
pub enum Property {
    Variable(Variable),
    Method(Method),
    Object(Object),
}

impl Property {
    fn ops(&self) -> &dyn PropertyOps {
        match self {
            Self::Variable(v) => v,
            Self::Method(m) => m,
            Self::Object(o) => o,
        }
    }

    pub(crate) fn core(&self) -> &PropertyCore {
        match self {
            Self::Variable(v) => v.core(),
            Self::Method(m) => m.core(),
            Self::Object(o) => o.core(),
        }
    }

    fn core_mut(&mut self) -> &mut PropertyCore {
        match self {
            Self::Variable(v) => v.core_mut(),
            Self::Method(m) => m.core_mut(),
            Self::Object(o) => o.core_mut(),
        }
    }

    /// Stores an already checked value, recursing into object children.
    pub(crate) fn store_value(&self, value: Value) {
        match self {
            Self::Variable(v) => v.core().store(value),
            Self::Object(o) => o.store_fields(value),
            Self::Method(_) => {}
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Self::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PropertyOps for Property {
    fn name(&self) -> &str {
        self.ops().name()
    }

    fn allow(&self) -> Allow {
        self.ops().allow()
    }

    fn is_internal(&self) -> bool {
        self.ops().is_internal()
    }

    fn typecheck(&self, value: Option<&Value>) -> bool {
        self.ops().typecheck(value)
    }

    fn read(&self) -> PtlResult<Value> {
        self.ops().read()
    }

    fn write(&self, value: Option<Value>) -> PtlResult<()> {
        self.ops().write(value)
    }

    fn sync(&self) -> PropertySync {
        self.ops().sync()
    }

    fn visible_value(&self) -> Value {
        self.ops().visible_value()
    }

    fn start_watch(&self) {
        self.ops().start_watch()
    }

    fn check_changes(&self) -> bool {
        self.ops().check_changes()
    }

    fn end_watch(&self) {
        self.ops().end_watch()
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PtlProperty \"{}\"]", self.name())
    }
}

impl From<Variable> for Property {
    fn from(v: Variable) -> Self {
        Self::Variable(v)
    }
}

impl From<Method> for Property {
    fn from(m: Method) -> Self {
        Self::Method(m)
    }
}

impl From<Object> for Property {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Ordered name → property table of a layer or an object.
///
/// Properties receive their name when they are added:
///
/// ```rust
/// use ptl_server::domain::{Schema, Variable};
/// use ptl_server::domain::property::PropertyOps;
///
/// let schema = Schema::new()
///     .with("counter", Variable::number(0).readonly())
///     .with("title", Variable::string("ptl test"));
/// assert_eq!(schema.get("title").map(|p| p.name()), Some("title"));
/// assert_eq!(schema.names().collect::<Vec<_>>(), vec!["counter", "title"]);
/// ```
#[derive(Debug, Default)]
pub struct Schema {
    entries: Vec<Property>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `property` under `name`, replacing a previous one in place.
    pub fn with(mut self, name: impl Into<String>, property: impl Into<Property>) -> Self {
        self.insert(name, property);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, property: impl Into<Property>) {
        let name = name.into();
        let mut property = property.into();
        property.core_mut().set_name(name.clone());
        match self.index.get(&name) {
            Some(&i) => self.entries[i] = property,
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(property);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_assigns_names_and_keeps_order() {
        let schema = Schema::new()
            .with("b", Variable::number(1))
            .with("a", Variable::number(2));
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(schema.get("a").unwrap().name(), "a");
    }

    #[test]
    fn test_schema_replaces_duplicate_name_in_place() {
        // Arrange
        let schema = Schema::new()
            .with("x", Variable::number(1))
            .with("y", Variable::number(2))
            .with("x", Variable::string("again"));

        // Assert
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(schema.get("x").unwrap().read().unwrap(), json!("again"));
    }

    #[test]
    fn test_start_watch_is_idempotent() {
        // Arrange: a write inside an open watch window
        let core = PropertyCore::new(json!(0), Allow::READ_WRITE);
        core.start_watch();
        core.store(json!(1));

        // Act: a nested start must not clear the change
        core.start_watch();

        // Assert
        assert!(core.changed());
    }

    #[test]
    fn test_start_watch_after_end_resets_changed() {
        let core = PropertyCore::new(json!(0), Allow::READ_WRITE);
        core.start_watch();
        core.store(json!(1));
        core.end_watch();

        core.start_watch();

        assert!(!core.changed());
    }

    #[test]
    fn test_property_display_names_the_property() {
        let schema = Schema::new().with("title", Variable::string("t"));
        assert_eq!(
            schema.get("title").unwrap().to_string(),
            "[PtlProperty \"title\"]"
        );
    }
}
