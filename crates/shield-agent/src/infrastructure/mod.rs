//! Infrastructure layer for the agent.
//!
//! - `network`:  sealed TCP link to HQ ([`network::AgentConnection`]).
//! - `storage`:  TOML config file.
//! - `terminal`: operator input parsing.

pub mod network;
pub mod storage;
pub mod terminal;
