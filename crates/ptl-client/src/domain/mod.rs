//! Domain layer of the client: the remote mirror and the client vocabulary.
//!
//! # Sub-modules
//!
//! - **`remote_schema`** – the [`RemoteProperty`] enum, ordered
//!   [`RemoteSchema`]s, the open [`PropertyFactories`] registry and the
//!   [`MirrorScope`] factories build nodes in.
//! - **`remote_variable`** / **`remote_method`** / **`remote_object`** – the
//!   mirror node kinds.
//! - **`remote_layer`** – [`RemoteLayer`], one synced layer.
//! - **`link`** – the weak [`Link`] mirror nodes queue actions through.
//! - **`config`** / **`error`** – [`ClientConfig`], [`ClientError`] and
//!   [`TransportError`].
//!
//! Nothing in here performs I/O.

pub mod config;
pub mod error;
pub mod link;
pub mod remote_layer;
pub mod remote_method;
pub mod remote_object;
pub mod remote_schema;
pub mod remote_variable;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError};
pub use link::{Link, Requester};
pub use remote_layer::RemoteLayer;
pub use remote_method::RemoteMethod;
pub use remote_object::RemoteObject;
pub use remote_schema::{MirrorScope, PropertyFactories, PropertyFactory, RemoteProperty, RemoteSchema};
pub use remote_variable::RemoteVariable;
