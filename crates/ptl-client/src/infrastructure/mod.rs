//! Infrastructure layer of the client.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `ptl_core`, but the domain layer MUST NOT import it.
//!
//! # Sub-modules
//!
//! - **`http_transport`** – [`HttpTransport`], the `reqwest` implementation of
//!   the [`Transport`](crate::application::Transport) seam.

pub mod http_transport;

pub use http_transport::HttpTransport;
