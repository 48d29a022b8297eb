//! Reserved control tokens exchanged during the handshake.
//!
//! Tokens are plain ASCII before sealing.  The acknowledgement may carry the
//! agent's preferred display name after a colon: `AUTH_ACK:ghost-3`.

/// Beacon sent repeatedly by HQ while waiting for the agent.
pub const AUTH_REQUEST: &str = "AUTH_REQUEST";
/// Agent's reply to a beacon it could open.
pub const AUTH_ACK: &str = "AUTH_ACK";
/// HQ admitted the agent.
pub const ACCESS_GRANTED: &str = "ACCESS_GRANTED";
/// HQ rejected the agent's reply.
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";

/// A decoded handshake token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    AuthRequest,
    AuthAck { name: Option<String> },
    AccessGranted,
    AccessDenied,
}

impl ControlToken {
    /// Parses an opened payload.  Returns `None` for anything that is not an
    /// exact token.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        match text {
            AUTH_REQUEST => Some(ControlToken::AuthRequest),
            AUTH_ACK => Some(ControlToken::AuthAck { name: None }),
            ACCESS_GRANTED => Some(ControlToken::AccessGranted),
            ACCESS_DENIED => Some(ControlToken::AccessDenied),
            _ => {
                let name = text.strip_prefix(AUTH_ACK)?.strip_prefix(':')?;
                Some(ControlToken::AuthAck {
                    name: (!name.is_empty()).then(|| name.to_string()),
                })
            }
        }
    }

    /// Renders the token as its pre-seal text.
    pub fn to_text(&self) -> String {
        match self {
            ControlToken::AuthRequest => AUTH_REQUEST.to_string(),
            ControlToken::AuthAck { name: None } => AUTH_ACK.to_string(),
            ControlToken::AuthAck { name: Some(name) } => format!("{AUTH_ACK}:{name}"),
            ControlToken::AccessGranted => ACCESS_GRANTED.to_string(),
            ControlToken::AccessDenied => ACCESS_DENIED.to_string(),
        }
    }
}
