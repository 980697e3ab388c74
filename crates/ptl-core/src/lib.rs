//! # ptl-core
//!
//! Shared vocabulary of the Projectile protocol: the error taxonomy, variable
//! type checks, the request/response envelopes and the sync descriptions a
//! client rebuilds its mirror from.
//!
//! This crate is used by both `ptl-server` and `ptl-client`.  It has no
//! dependencies on sockets, HTTP or async runtimes.
//!
//! # Architecture overview
//!
//! A server exposes named *layers*: trees of variables, methods and nested
//! objects.  A client asks for the schema once (`sync`), builds a local
//! mirror, and then sends *batches* of `call`/`get`/`set` actions.  Every
//! batch is answered with one result per action plus a *patch* of the values
//! that changed on the layers the batch touched.
//!
//! - **`protocol`** – the JSON documents exchanged per batch
//!   ([`RequestEnvelope`], [`ResponseEnvelope`]) and the schema descriptions
//!   ([`LayerSync`], [`PropertySync`]).
//! - **`types`** – variable type tags and the [`TypeRegistry`].
//! - **`error`** – [`PtlError`] and its wire form [`ErrorInfo`].

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ErrorInfo, PtlError, PtlResult};
pub use protocol::messages::{
    Action, ActionKind, ActionOutcome, LayerPatch, Patch, RequestEnvelope, ResponseEnvelope,
    WILDCARD_LAYER,
};
pub use protocol::sync::{Allow, LayerSync, PropertySync, SchemaSync};
pub use protocol::version::{request_tag, response_tag, PROTOCOL_VERSION};
pub use types::{typename, TypeRegistry, VarType};
