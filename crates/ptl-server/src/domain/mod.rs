//! Domain layer of the server: the property model and layers.
//!
//! # Sub-modules
//!
//! - **`property`** – the [`PropertyOps`] contract, the [`Property`] enum and
//!   the ordered [`Schema`] table.
//! - **`variable`** / **`object`** / **`method`** – the three property kinds.
//! - **`layer`** – [`Layer`] (path lookup, sync, patches) and the
//!   [`LayerContent`] view handed to method bodies.
//! - **`context`** – the per-batch [`RequestContext`].
//!
//! Nothing in here performs I/O; the pipeline in `application` drives it.

pub mod context;
pub mod layer;
pub mod method;
pub mod object;
pub mod property;
pub mod variable;

pub use context::RequestContext;
pub use layer::{Layer, LayerContent};
pub use method::{Invocation, Method, MethodBody};
pub use object::Object;
pub use property::{Property, PropertyOps, Schema};
pub use variable::Variable;
