//! Protocol version tags.
//!
//! Requests are tagged `req@<version>` and responses `res@<version>`; both
//! sides reject envelopes whose tag does not match their own version.

/// Version spoken by default by server and client.
pub const PROTOCOL_VERSION: &str = "0.0.1";

/// `"req@" + version`.
pub fn request_tag(version: &str) -> String {
    format!("req@{version}")
}

/// `"res@" + version`.
pub fn response_tag(version: &str) -> String {
    format!("res@{version}")
}
