//! Variable type tags and the type registry.
//!
//! A variable's declared type is either one of the three primitives
//! (`String`, `Number`, `Boolean`) or a *composite*: a named predicate over
//! JSON values.  Composites stand in for "instanceof"-style checks; a
//! `Point` type, for example, is registered as a predicate accepting objects
//! with numeric `x` and `y`.
//!
//! The registry is plain configuration state owned by one server or client
//! instance.  There is no process-wide type table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::PtlError;

/// Predicate deciding whether a JSON value belongs to a composite type.
pub type TypeCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// How a [`VarType`] decides membership.
#[derive(Clone)]
pub enum TypeKind {
    String,
    Number,
    Boolean,
    Composite(TypeCheck),
}

/// A named variable type.
#[derive(Clone)]
pub struct VarType {
    name: String,
    kind: TypeKind,
}

impl VarType {
    pub fn string() -> Self {
        Self::primitive("String", TypeKind::String)
    }

    pub fn number() -> Self {
        Self::primitive("Number", TypeKind::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive("Boolean", TypeKind::Boolean)
    }

    /// Any JSON object.
    pub fn object() -> Self {
        Self::composite("Object", Value::is_object)
    }

    /// Any JSON array.
    pub fn array() -> Self {
        Self::composite("Array", Value::is_array)
    }

    /// A user-defined type accepted by `check`.
    ///
    /// ```rust
    /// use ptl_core::VarType;
    /// use serde_json::json;
    ///
    /// let point = VarType::composite("Point", |v| v["x"].is_number() && v["y"].is_number());
    /// assert!(point.accepts(&json!({"x": 1, "y": 2})));
    /// assert!(!point.accepts(&json!("1,2")));
    /// ```
    pub fn composite<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: TypeKind::Composite(Arc::new(check)),
        }
    }

    fn primitive(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// The name synced to clients in the `T` field.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Whether a non-null `value` belongs to this type.
    ///
    /// `null` handling is the variable's business (it depends on
    /// `nullable`), so `null` is only accepted here if a composite predicate
    /// says so.
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.kind {
            TypeKind::String => value.is_string(),
            TypeKind::Number => value.is_number(),
            TypeKind::Boolean => value.is_boolean(),
            TypeKind::Composite(check) => check(value),
        }
    }
}

impl fmt::Debug for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VarType").field(&self.name).finish()
    }
}

impl PartialEq for VarType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Runtime type name of a value, as used in type error messages.
///
/// `None` stands for an absent value (e.g. a `set` action without
/// arguments).
pub fn typename(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "Boolean",
        Some(Value::Number(_)) => "Number",
        Some(Value::String(_)) => "String",
        Some(Value::Array(_)) => "Array",
        Some(Value::Object(_)) => "Object",
    }
}

/// The type error raised when assigning `value` to property `name`.
pub fn assign_error(name: &str, expected: &str, value: Option<&Value>) -> PtlError {
    PtlError::Type(format!(
        "Cannot assign {name}: expected {expected}, got {}",
        typename(value)
    ))
}

/// Name → type table.
///
/// Created with the built-in types and extended by the owner with
/// [`TypeRegistry::register`].
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: HashMap<String, VarType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// An empty registry.  Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// A registry holding `String`, `Number`, `Boolean`, `Object` and `Array`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for ty in [
            VarType::string(),
            VarType::number(),
            VarType::boolean(),
            VarType::object(),
            VarType::array(),
        ] {
            registry.register(ty);
        }
        registry
    }

    /// Adds (or replaces) a type under its own name.
    pub fn register(&mut self, ty: VarType) {
        self.types.insert(ty.name().to_string(), ty);
    }

    /// Registers a composite type from a predicate.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.register(VarType::composite(name, check));
    }

    pub fn resolve(&self, name: &str) -> Option<VarType> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
