//! Protocol error taxonomy shared by server and client.
//!
//! Every failure that can travel over the wire is a [`PtlError`].  Each
//! variant knows its HTTP-like status code and the error "type" name that is
//! reported to the peer, so a per-action failure can be rendered as
//!
//! ```json
//! {"message": "counter is not writeable", "code": 403, "type": "IllegalAccessError"}
//! ```
//!
//! and turned back into a typed error on the other side with
//! [`PtlError::from_info`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status used for malformed requests, version mismatches and unknown actions.
pub const BAD_REQUEST: u16 = 400;
/// Status used when a permission flag forbids a read or a write.
pub const FORBIDDEN: u16 = 403;
/// Status used for unknown layers and property paths.
pub const NOT_FOUND: u16 = 404;
/// Status used when the transport receives anything but a POST.
pub const METHOD_NOT_ALLOWED: u16 = 405;
/// Status used for unexpected failures after the request body was parsed.
pub const INTERNAL_ERROR: u16 = 500;

/// Convenience alias used across the workspace.
pub type PtlResult<T> = Result<T, PtlError>;

/// All protocol-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PtlError {
    /// Generic protocol failure carrying an explicit status code.
    #[error("{message}")]
    Protocol { message: String, code: u16 },

    /// A read or write was attempted against the property's permission flags.
    #[error("{0}")]
    IllegalAccess(String),

    /// A value failed a type check, or an action targeted the wrong kind of
    /// property (e.g. `call` on a variable).
    #[error("{0}")]
    Type(String),

    /// A layer or property path does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A required argument was omitted.
    #[error("{0}")]
    Argument(String),

    /// Unexpected failure (e.g. a panicking method body).
    #[error("{0}")]
    Internal(String),
}

impl PtlError {
    /// Builds a [`PtlError::Protocol`] with an explicit status code.
    pub fn protocol(message: impl Into<String>, code: u16) -> Self {
        Self::Protocol {
            message: message.into(),
            code,
        }
    }

    /// Builds a 400-class protocol error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::protocol(message, BAD_REQUEST)
    }

    /// Error raised when a required argument is missing.
    ///
    /// ```rust
    /// use ptl_core::PtlError;
    ///
    /// let err = PtlError::required("url");
    /// assert_eq!(err.to_string(), "url is required argument");
    /// assert_eq!(err.code(), Some(400));
    /// ```
    pub fn required(what: &str) -> Self {
        Self::Argument(format!("{what} is required argument"))
    }

    /// HTTP-like status code of this error, if it has one.
    ///
    /// Type errors deliberately carry no code: they are reported with
    /// `code` omitted and become a 500 when they abort a whole batch.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            Self::IllegalAccess(_) => Some(FORBIDDEN),
            Self::NotFound(_) => Some(NOT_FOUND),
            Self::Argument(_) => Some(BAD_REQUEST),
            Self::Internal(_) => Some(INTERNAL_ERROR),
            Self::Type(_) => None,
        }
    }

    /// Name of the error kind as reported in the `type` field on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "PtlError",
            Self::IllegalAccess(_) => "IllegalAccessError",
            Self::Type(_) => "TypeError",
            Self::NotFound(_) => "ReferenceError",
            Self::Argument(_) => "ArgumentError",
            Self::Internal(_) => "Error",
        }
    }

    /// Serializable description of this error.
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            message: self.to_string(),
            code: self.code(),
            kind: Some(self.type_name().to_string()),
        }
    }

    /// Reconstructs a typed error from its wire description.
    ///
    /// Unknown or missing `type` names fall back to [`PtlError::Protocol`]
    /// when a code is present and to [`PtlError::Internal`] otherwise.
    pub fn from_info(info: &ErrorInfo) -> Self {
        let message = info.message.clone();
        match info.kind.as_deref() {
            Some("IllegalAccessError") => Self::IllegalAccess(message),
            Some("TypeError") => Self::Type(message),
            Some("ReferenceError") => Self::NotFound(message),
            Some("ArgumentError") => Self::Argument(message),
            _ => match info.code {
                Some(code) => Self::protocol(message, code),
                None => Self::Internal(message),
            },
        }
    }
}

/// Wire form of an error: `{message, code?, type?}`.
///
/// Whole-batch errors only carry `message`; per-action errors carry all three
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorInfo {
    /// A message-only error, as used in the top-level `errors` array.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: None,
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<&PtlError> for ErrorInfo {
    fn from(error: &PtlError) -> Self {
        error.to_info()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
