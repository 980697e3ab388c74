//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the server's TOML configuration, falls back
//! to defaults when the file does not exist yet, and can write a default file
//! for the user to edit.

pub mod config;
