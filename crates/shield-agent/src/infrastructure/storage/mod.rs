//! Storage infrastructure: the agent's config file.

pub mod config;
