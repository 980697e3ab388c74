//! Request and response envelopes.
//!
//! One batch is one request envelope answered by one response envelope:
//!
//! ```text
//! Client → Server:  {"ptl":"req@0.0.1","ctx":{...},"do":[action, ...]}
//! Server → Client:  {"ptl":"res@0.0.1","ctx":{...},"patch":{...},"result":[outcome, ...]}
//! ```
//!
//! `result` is positionally aligned with `do`.  A batch that fails as a whole
//! is answered with `result: null` and a top-level `errors` array instead.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorInfo, PtlError};

/// Layer name addressing every exposed layer (only valid with `sync`).
pub const WILDCARD_LAYER: &str = "*";

/// Changed property values of one layer: property name → current value.
pub type LayerPatch = Map<String, Value>;

/// Patches of every layer touched by a batch, keyed by layer name.
pub type Patch = BTreeMap<String, LayerPatch>;

/// The four actions a batch entry can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionKind {
    #[default]
    Call,
    Get,
    Set,
    Sync,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Get => "get",
            Self::Set => "set",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = PtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(Self::Call),
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "sync" => Ok(Self::Sync),
            other => Err(PtlError::bad_request(format!("Unknown action \"{other}\""))),
        }
    }
}

/// One entry of the request's `do` list.
///
/// `action` is kept as the raw string received on the wire so that an
/// unknown tag fails only its own entry (see [`Action::kind`]) instead of the
/// whole envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// `"<layer>/<dotted.property.path>"`, or `"*"` for a full sync.
    pub name: String,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

fn default_action() -> String {
    ActionKind::Call.as_str().to_string()
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            action: kind.as_str().to_string(),
            args,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(name, ActionKind::Call, args)
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Get, Vec::new())
    }

    pub fn set(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, ActionKind::Set, vec![value])
    }

    /// Sync of a single layer, or of every layer with [`WILDCARD_LAYER`].
    pub fn sync(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Sync, Vec::new())
    }

    /// Parses the action tag.
    ///
    /// # Errors
    ///
    /// Returns a 400-class [`PtlError`] for tags other than
    /// `call`/`get`/`set`/`sync`.
    pub fn kind(&self) -> Result<ActionKind, PtlError> {
        self.action.parse()
    }

    /// Splits `name` into the layer name and the optional property path.
    ///
    /// ```rust
    /// use ptl_core::Action;
    ///
    /// let action = Action::get("api/point.x");
    /// assert_eq!(action.target(), ("api", Some("point.x")));
    /// assert_eq!(Action::sync("*").target(), ("*", None));
    /// ```
    pub fn target(&self) -> (&str, Option<&str>) {
        match self.name.split_once('/') {
            Some((layer, path)) if !path.is_empty() => (layer, Some(path)),
            Some((layer, _)) => (layer, None),
            None => (self.name.as_str(), None),
        }
    }
}

/// A batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Protocol tag, `"req@<version>"`.
    pub ptl: String,
    /// Opaque client context (session token, etc.).
    #[serde(default)]
    pub ctx: Value,
    #[serde(rename = "do")]
    pub actions: Vec<Action>,
}

/// Outcome of one action: exactly one of `data` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl ActionOutcome {
    pub fn success(data: Value) -> Self {
        Self { data, error: None }
    }

    pub fn failure(error: &PtlError) -> Self {
        Self {
            data: Value::Null,
            error: Some(error.to_info()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Result<Value, PtlError>> for ActionOutcome {
    fn from(result: Result<Value, PtlError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(&error),
        }
    }
}

/// A batch response (success or whole-batch failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Protocol tag, `"res@<version>"`.
    pub ptl: String,
    /// Fields the server asked the client to merge into its context.
    #[serde(default)]
    pub ctx: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    /// Per-action outcomes, `null` when the whole batch failed.
    #[serde(default)]
    pub result: Option<Vec<ActionOutcome>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorInfo>,
}

impl ResponseEnvelope {
    pub fn success(
        ptl: String,
        ctx: Map<String, Value>,
        patch: Patch,
        result: Vec<ActionOutcome>,
    ) -> Self {
        Self {
            ptl,
            ctx,
            patch: Some(patch),
            result: Some(result),
            errors: Vec::new(),
        }
    }

    /// The whole-batch failure form: empty context, no result, one error.
    pub fn failure(ptl: String, message: impl Into<String>) -> Self {
        Self {
            ptl,
            ctx: Map::new(),
            patch: None,
            result: None,
            errors: vec![ErrorInfo::message(message)],
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_defaults_to_call_without_args() {
        // Arrange
        let raw = json!({"name": "api/increment"});

        // Act
        let action: Action = serde_json::from_value(raw).unwrap();

        // Assert
        assert_eq!(action.kind(), Ok(ActionKind::Call));
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_unknown_action_tag_is_a_400() {
        let action: Action =
            serde_json::from_value(json!({"name": "api/x", "action": "delete"})).unwrap();
        let err = action.kind().unwrap_err();
        assert_eq!(err.code(), Some(400));
        assert!(err.to_string().contains("delete"));
    }

    #[test]
    fn test_target_splits_layer_and_path() {
        assert_eq!(Action::call("api/auth", vec![]).target(), ("api", Some("auth")));
        assert_eq!(Action::sync("api").target(), ("api", None));
        assert_eq!(Action::sync("api/").target(), ("api", None));
    }

    #[test]
    fn test_request_envelope_uses_do_key() {
        let envelope = RequestEnvelope {
            ptl: "req@0.0.1".into(),
            ctx: json!({}),
            actions: vec![Action::get("api/counter")],
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["do"][0]["action"], "get");
    }

    #[test]
    fn test_outcome_serializes_null_error_on_success() {
        let json = serde_json::to_value(ActionOutcome::success(json!(8))).unwrap();
        assert_eq!(json, json!({"data": 8, "error": null}));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let json = serde_json::to_value(ResponseEnvelope::failure("res@0.0.1".into(), "boom")).unwrap();
        assert_eq!(
            json,
            json!({"ptl": "res@0.0.1", "ctx": {}, "result": null, "errors": [{"message": "boom"}]})
        );
    }
}
