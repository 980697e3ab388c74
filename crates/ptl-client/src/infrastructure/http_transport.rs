//! `reqwest` implementation of the [`Transport`] seam.
//!
//! The body is decoded as an envelope whatever the HTTP status: the server
//! answers whole-batch failures (400, 405, 500, ...) with an error envelope,
//! and the client needs its `errors` list rather than a bare status.

use async_trait::async_trait;
use ptl_core::{RequestEnvelope, ResponseEnvelope};
use tracing::debug;

use crate::application::transport::Transport;
use crate::domain::TransportError;

/// Posts envelopes as JSON over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Uses a preconfigured `reqwest` client (timeouts, proxies, TLS).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, TransportError> {
        let failed = |e: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.http.post(url).json(request).send().await.map_err(failed)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(failed)?;
        debug!(status, bytes = body.len(), "response received");

        serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            url: url.to_string(),
            status,
            message: e.to_string(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
