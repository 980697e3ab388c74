//! The transport seam: how a batch reaches the server.
//!
//! The client never opens sockets itself. It hands each request envelope to
//! a [`Transport`] and processes whatever envelope comes back. The HTTP
//! implementation lives in `infrastructure::http_transport`; tests use a
//! mock or an in-process loopback.

use async_trait::async_trait;
use ptl_core::{RequestEnvelope, ResponseEnvelope};

use crate::domain::TransportError;

/// Sends one request envelope and returns the response envelope.
///
/// Implementations return the decoded envelope whatever the HTTP status:
/// whole-batch failures arrive as envelopes with a non-empty `errors` list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, TransportError>;
}
