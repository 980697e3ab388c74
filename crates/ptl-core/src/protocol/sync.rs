//! Sync descriptions: the serialized schema a client rebuilds its mirror from.
//!
//! ```json
//! {"name": "api", "schema": {
//!     "counter":   {"_type": "variable", "name": "counter", "_value": 0,
//!                   "_allow": {"r": true, "w": false}, "_nullable": false, "T": "Number"},
//!     "increment": {"_type": "method", "name": "increment", "_value": null,
//!                   "_allow": {"r": true, "w": false}, "isArrow": true, "isContextual": true}
//! }}
//! ```
//!
//! `_type` is kept as a plain string: the client resolves it through an open
//! registry of property factories, so new kinds can be added without touching
//! this type.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Discriminator of plain variables.
pub const VARIABLE_TAG: &str = "variable";
/// Discriminator of methods.
pub const METHOD_TAG: &str = "method";
/// Discriminator of object variables.
pub const OBJECT_TAG: &str = "object";

/// Read/write permission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allow {
    pub r: bool,
    pub w: bool,
}

impl Allow {
    /// Default of every property: readable, not writable.
    pub const READ_ONLY: Self = Self { r: true, w: false };
    /// Default of variables.
    pub const READ_WRITE: Self = Self { r: true, w: true };
    pub const WRITE_ONLY: Self = Self { r: false, w: true };
}

impl Default for Allow {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

/// Serialized form of one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySync {
    #[serde(rename = "_type")]
    pub kind: String,
    pub name: String,
    #[serde(rename = "_value", default)]
    pub value: Value,
    #[serde(rename = "_allow", default)]
    pub allow: Allow,
    #[serde(rename = "_nullable", default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "_volatile", default, skip_serializing_if = "Option::is_none")]
    pub volatile: Option<bool>,
    #[serde(rename = "T", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "isArrow", default, skip_serializing_if = "Option::is_none")]
    pub is_arrow: Option<bool>,
    #[serde(rename = "isContextual", default, skip_serializing_if = "Option::is_none")]
    pub is_contextual: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSync>,
}

impl PropertySync {
    /// A bare description of the given kind; callers fill in the rest.
    pub fn new(kind: &str, name: impl Into<String>, value: Value, allow: Allow) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.into(),
            value,
            allow,
            nullable: None,
            volatile: None,
            type_name: None,
            is_arrow: None,
            is_contextual: None,
            schema: None,
        }
    }
}

/// Ordered property descriptions, serialized as a JSON object keyed by name.
///
/// Declaration order of the server schema is preserved across the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaSync(pub Vec<PropertySync>);

impl SchemaSync {
    pub fn get(&self, name: &str) -> Option<&PropertySync> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PropertySync> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PropertySync> for SchemaSync {
    fn from_iter<I: IntoIterator<Item = PropertySync>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for SchemaSync {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for property in &self.0 {
            map.serialize_entry(&property.name, property)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SchemaSync {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = SchemaSync;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property name to property description")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SchemaSync, A::Error> {
                let mut properties = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, mut property)) = access.next_entry::<String, PropertySync>()? {
                    // The map key is authoritative for the property name.
                    property.name = key;
                    properties.push(property);
                }
                Ok(SchemaSync(properties))
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

/// Serialized form of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSync {
    pub name: String,
    pub schema: SchemaSync,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
