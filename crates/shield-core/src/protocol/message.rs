//! Application-level messages carried inside sealed frames.
//!
//! The relay itself never inspects message kinds; it forwards sealed bytes.
//! Endpoints decode each opened payload exactly once into a [`Message`] and
//! consumers match on the variant instead of searching the text again.
//!
//! Classification rules, in order:
//!
//! 1. Text containing `RADIO:` is a voice broadcast.  The content is
//!    everything after the first occurrence, trimmed.
//! 2. Text starting with `SYSTEM:` is a notice from HQ.
//! 3. Everything else is chat.

use std::fmt;

/// Marker that turns a line into a voice broadcast.
pub const RADIO_MARKER: &str = "RADIO:";
/// Prefix HQ puts on its own notices.
pub const SYSTEM_PREFIX: &str = "SYSTEM:";

/// A decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ordinary text, shown as-is.
    Chat(String),
    /// Voice broadcast content, handed to speech playback by the UI.
    Radio(String),
    /// Notice generated by HQ (joins, departures, moderator announcements).
    System(String),
}

impl Message {
    /// Decodes opened text into a message kind.
    pub fn classify(text: &str) -> Self {
        if let Some(idx) = text.find(RADIO_MARKER) {
            let content = text[idx + RADIO_MARKER.len()..].trim();
            return Message::Radio(content.to_string());
        }
        if let Some(rest) = text.strip_prefix(SYSTEM_PREFIX) {
            return Message::System(rest.trim().to_string());
        }
        Message::Chat(text.to_string())
    }

    /// Builds the wire text for a chat line from `sender`.
    pub fn chat_line(sender: &str, text: &str) -> String {
        format!("{sender}: {text}")
    }

    /// Builds the wire text for a radio broadcast from `sender`.
    pub fn radio_line(sender: &str, text: &str) -> String {
        format!("{sender} {RADIO_MARKER} {text}")
    }

    /// Builds the wire text for an HQ notice.
    pub fn system_line(text: &str) -> String {
        format!("{SYSTEM_PREFIX} {text}")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Chat(t) => write!(f, "{t}"),
            Message::Radio(t) => write!(f, "[RADIO] {t}"),
            Message::System(t) => write!(f, "[HQ] {t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_plain_text_is_chat() {
        assert_eq!(
            Message::classify("ghost: hello"),
            Message::Chat("ghost: hello".to_string())
        );
    }

    #[test]
    fn test_classify_radio_takes_text_after_first_marker() {
        assert_eq!(
            Message::classify("ghost RADIO:   move out  RADIO: now"),
            Message::Radio("move out  RADIO: now".to_string())
        );
    }

    #[test]
    fn test_classify_radio_wins_over_system_prefix() {
        assert_eq!(
            Message::classify("SYSTEM: RADIO: test"),
            Message::Radio("test".to_string())
        );
    }

    #[test]
    fn test_classify_system_notice() {
        assert_eq!(
            Message::classify("SYSTEM: AGENT_7 joined"),
            Message::System("AGENT_7 joined".to_string())
        );
    }

    #[test]
    fn test_builders_classify_back_to_their_kind() {
        assert!(matches!(
            Message::classify(&Message::radio_line("echo", "contact north")),
            Message::Radio(t) if t == "contact north"
        ));
        assert!(matches!(
            Message::classify(&Message::system_line("echo left")),
            Message::System(t) if t == "echo left"
        ));
        assert!(matches!(
            Message::classify(&Message::chat_line("echo", "hi")),
            Message::Chat(t) if t == "echo: hi"
        ));
    }

    #[test]
    fn test_display_tags_kind() {
        assert_eq!(Message::Radio("x".into()).to_string(), "[RADIO] x");
        assert_eq!(Message::System("y".into()).to_string(), "[HQ] y");
        assert_eq!(Message::Chat("z".into()).to_string(), "z");
    }
}
