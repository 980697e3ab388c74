//! Application layer use cases for the server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (OS/network/storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "run this batch
//!   of actions and report what changed").
//! - **Depend on abstractions** (traits such as [`request_hooks::RequestHook`])
//!   rather than concrete implementations.
//! - **Contain no sockets and no file system access**.
//!
//! # Sub-modules
//!
//! - **`handle_batch`**  – The request pipeline ([`handle_batch::PtlServer`]):
//!   version check, hooks, sequential action dispatch and patch collection.
//!   Every request the server receives goes through it.
//!
//! - **`request_hooks`** – The hook trait run before each batch and the
//!   per-batch set of exposed layers hooks may edit.

pub mod handle_batch;
pub mod request_hooks;
