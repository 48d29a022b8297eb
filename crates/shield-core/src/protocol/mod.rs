//! Wire protocol: frame envelope, control tokens, handshake, and message kinds.
//!
//! Every line on the wire is one frame.  Before authentication a frame carries
//! a [`ControlToken`]; afterwards it carries chat text that endpoints decode
//! into a [`Message`].  HQ never needs to open relayed frames to forward them.

pub mod envelope;
pub mod handshake;
pub mod message;
pub mod tokens;

pub use envelope::{Envelope, EnvelopeError};
pub use handshake::{
    accept_handshake, initiate_handshake, AcceptorOutcome, HandshakeConfig, HandshakeError,
    HandshakeState, InitiatorOutcome,
};
pub use message::Message;
pub use tokens::ControlToken;
