//! Operator input on the agent's standard input.
//!
//! Plain lines are chat.  A leading `/` selects a command:
//!
//! ```text
//! /radio <text>   voice broadcast
//! /connect        open the link (toggle)
//! /disconnect     close the link (toggle)
//! /quit
//! /help
//! ```

pub const HELP: &str = "type a line to chat | /radio <text> | /connect | /disconnect | /quit | /help";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    Chat(String),
    Radio(String),
    Connect,
    Disconnect,
    Quit,
    Help,
    /// Whitespace only.
    Empty,
}

impl AgentCommand {
    /// Parses a line.  Returns the usage text for an unknown command.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(AgentCommand::Empty);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(AgentCommand::Chat(line.to_string()));
        };

        let (verb, arg) = match command.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (command, ""),
        };
        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("radio", text) if !text.is_empty() => Ok(AgentCommand::Radio(text.to_string())),
            ("connect", _) => Ok(AgentCommand::Connect),
            ("disconnect", _) => Ok(AgentCommand::Disconnect),
            ("quit", _) | ("exit", _) => Ok(AgentCommand::Quit),
            ("help", _) => Ok(AgentCommand::Help),
            _ => Err(HELP.to_string()),
        }
    }
}
