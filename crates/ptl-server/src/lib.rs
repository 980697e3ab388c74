//! Projectile server library.
//!
//! A server exposes named *layers*. Each layer is an ordered set of typed
//! variables, methods and nested objects. Clients send batches of actions
//! (`call`, `get`, `set`, `sync`) to a single HTTP endpoint. The server runs
//! them in order and answers with one outcome per action plus a *patch* of
//! every value that changed while the batch ran.
//!
//! # Module tree (for beginners)
//!
//! ```text
//! domain          property model: Variable, Method, Object, Layer, Schema
//! application     the batch pipeline (PtlServer) and pre-request hooks
//! infrastructure  axum endpoint + TOML config storage
//! demo            the sample `api` layer served by the binary
//! ```
//!
//! # Example
//!
//! ```
//! use ptl_server::domain::{Layer, Schema, Variable};
//! use ptl_server::PtlServer;
//!
//! let server = PtlServer::new().add_layer(Layer::new(
//!     "api",
//!     Schema::new().with("title", Variable::string("hello").readonly()),
//! ));
//! assert_eq!(server.layer_names().collect::<Vec<_>>(), ["api"]);
//! ```
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod demo;
pub mod domain;
pub mod infrastructure;

pub use application::handle_batch::{HttpReply, PtlServer};
pub use application::request_hooks::{ExposedLayers, RequestHook};
