//! Infrastructure layer for the server.
//!
//! Contains the OS-facing adapters: the axum HTTP endpoint and the TOML
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `ptl_core`, but MUST NOT be imported by the `application` or `domain`
//! layers.

pub mod http;
pub mod storage;
