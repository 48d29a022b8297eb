//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML file at startup, supplies defaults
//! when it does not exist yet, and writes the ban list back when a moderator
//! changes it.

pub mod config;
