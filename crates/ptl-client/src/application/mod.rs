//! Application layer of the client.
//!
//! # Sub-modules
//!
//! - **`client`** – [`PtlClient`]: the request buffer, batch flushing,
//!   response processing and the synced mirror.  Start here.
//!
//! - **`transport`** – the [`Transport`] trait the client posts envelopes
//!   through.  Tests replace it with a mock; production code uses the
//!   `reqwest` implementation from the infrastructure layer.
//!
//! - **`hooks`** – `afterResponseProcessed` / `onResponseError` listeners.

pub mod client;
pub mod hooks;
pub mod transport;

pub use client::PtlClient;
pub use hooks::{HookEvent, HookListener, HookName};
pub use transport::Transport;
