//! # shield-agent
//!
//! The agent side of Shield Relay: dials HQ, proves it holds the shared
//! password by answering the sealed beacon, then sends chat and radio lines
//! and shows what HQ relays back.
//!
//! - `application`:    [`application::comms::CommsUseCase`] and the
//!   [`Uplink`](application::comms::Uplink) / observer traits it depends on.
//! - `infrastructure`: the TCP uplink, config file, and terminal input.

pub mod application;
pub mod infrastructure;
