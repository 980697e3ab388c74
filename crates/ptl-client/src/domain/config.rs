//! Client connection settings.

use serde::{Deserialize, Serialize};

/// Where the client sends its batches and which protocol it speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the server endpoint, e.g. `http://127.0.0.1:8080/ptl`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Protocol version; requests are tagged `req@<version>`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_url() -> String {
    "http://127.0.0.1:8080/ptl".to_string()
}

fn default_protocol_version() -> String {
    ptl_core::PROTOCOL_VERSION.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
