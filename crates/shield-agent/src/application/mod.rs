//! Application layer for the agent.

pub mod comms;
