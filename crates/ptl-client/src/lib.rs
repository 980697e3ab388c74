//! ptl-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does ptl-client do? (for beginners)
//!
//! A Projectile server exposes *layers*: named trees of variables, methods
//! and objects.  The client:
//!
//! 1. Sends `{"name": "*", "action": "sync"}` and rebuilds every layer as a
//!    local *mirror* ([`RemoteLayer`]).
//! 2. Reads variables straight from the mirror, without a round trip.
//! 3. Queues writes and method calls, checking permissions and types
//!    locally first, and sends everything queued as one *batch*.
//! 4. Applies the *patch* that comes back with every batch, so the mirror
//!    follows the server's state.
//!
//! ```no_run
//! use ptl_client::{ClientConfig, PtlClient};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), ptl_client::ClientError> {
//! let client = PtlClient::http(ClientConfig::new("http://127.0.0.1:8080/ptl"));
//! client.sync().await?;
//! client
//!     .call("api/auth", vec![json!({"username": "bob", "password": "111"})])
//!     .await?;
//! let counter = client.call("api/increment", vec![]).await?;
//! println!("counter = {counter}");
//! # Ok(()) }
//! ```

/// Application layer: the client, its transport seam and hooks.
pub mod application;

/// Domain layer: the remote mirror, configuration and errors.
pub mod domain;

/// Infrastructure layer: the HTTP transport.
pub mod infrastructure;

pub use application::{HookEvent, HookListener, HookName, PtlClient, Transport};
pub use domain::{
    ClientConfig, ClientError, ClientResult, RemoteLayer, RemoteMethod, RemoteObject,
    RemoteProperty, RemoteVariable, TransportError,
};
pub use infrastructure::HttpTransport;
