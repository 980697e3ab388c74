//! Protocol module: envelopes, sync descriptions and version tags.

pub mod messages;
pub mod sync;
pub mod version;

pub use messages::*;
pub use sync::{Allow, LayerSync, PropertySync, SchemaSync, METHOD_TAG, OBJECT_TAG, VARIABLE_TAG};
pub use version::{request_tag, response_tag, PROTOCOL_VERSION};
