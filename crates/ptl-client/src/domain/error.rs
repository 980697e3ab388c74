//! Client error vocabulary.
//!
//! Errors are `Clone` because one whole-batch failure is handed to every
//! caller whose action travelled in that batch.

use ptl_core::{ErrorInfo, PtlError};
use thiserror::Error;

/// Failures of the transport collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The response body is not a protocol envelope.
    #[error("response from {url} (HTTP {status}) is not a ptl envelope: {message}")]
    Decode {
        url: String,
        status: u16,
        message: String,
    },
}

/// Everything a client operation can fail with.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// A per-action failure reported by the server, or a local permission or
    /// type check that rejected the action before it was sent.
    #[error(transparent)]
    Ptl(#[from] PtlError),

    /// The server rejected the whole batch (first entry of `errors`).
    #[error("batch rejected: {0}")]
    Batch(ErrorInfo),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response carries another protocol tag.
    #[error("Versions mismatch: expected \"{expected}\", got \"{got}\"")]
    VersionMismatch { expected: String, got: String },

    /// A synced variable names a type missing from the client's registry.
    #[error(
        "Unknown type for variable {variable}: \"{type_name}\". Did you register it with PtlClient::register_type?"
    )]
    UnknownType { variable: String, type_name: String },

    /// A sync description carries a `_type` with no registered factory.
    #[error("Unknown property type \"{0}\"")]
    UnknownPropertyKind(String),

    #[error("Unknown hook \"{0}\"")]
    UnknownHook(String),

    /// The response has fewer results than the batch had actions.
    #[error("no result for action #{0} in the response")]
    MissingResult(usize),

    /// Response data did not have the expected shape.
    #[error("malformed response data: {0}")]
    Decode(String),

    /// The client owning this mirror or reply has been dropped.
    #[error("the client was dropped before the reply arrived")]
    ClientDropped,
}

impl ClientError {
    /// HTTP-like status code, when the failure carries one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Ptl(e) => e.code(),
            Self::Batch(info) => info.code,
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

// ── Tests ─────────────────────────────────────────────────────────────────────
