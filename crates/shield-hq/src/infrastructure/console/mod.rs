//! Moderator console on HQ's standard input.
//!
//! ```text
//! list              sessions currently admitted
//! bans              banned addresses
//! kick <name>       remove every session carrying <name>
//! ban <addr>        ban an address and remove its sessions
//! unban <addr>      lift a ban and clear the failure counter
//! say <text>        sealed SYSTEM notice to everyone
//! help
//! ```
//!
//! Parsing and execution are separate so the command set can be tested
//! without a terminal.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::application::relay::Relay;

const HELP: &str = "commands: list | bans | kick <name> | ban <addr> | unban <addr> | say <text> | help";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Bans,
    Kick(String),
    Ban(IpAddr),
    Unban(IpAddr),
    Say(String),
    Help,
}

impl ConsoleCommand {
    /// Parses a console line.  Returns the usage text on error.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let parse_ip = |arg: &str| -> Result<IpAddr, String> {
            arg.parse()
                .map_err(|_| format!("`{arg}` is not an IP address"))
        };

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("list", _) => Ok(ConsoleCommand::List),
            ("bans", _) => Ok(ConsoleCommand::Bans),
            ("help", _) | ("?", _) => Ok(ConsoleCommand::Help),
            ("kick", name) if !name.is_empty() => Ok(ConsoleCommand::Kick(name.to_string())),
            ("ban", addr) if !addr.is_empty() => parse_ip(addr).map(ConsoleCommand::Ban),
            ("unban", addr) if !addr.is_empty() => parse_ip(addr).map(ConsoleCommand::Unban),
            ("say", text) if !text.is_empty() => Ok(ConsoleCommand::Say(text.to_string())),
            _ => Err(HELP.to_string()),
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub reply: String,
    /// The ban set changed and should be persisted.
    pub bans_changed: bool,
}

impl CommandOutcome {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            bans_changed: false,
        }
    }
}

/// Executes one command against the relay.
pub async fn execute(command: ConsoleCommand, relay: &Relay) -> CommandOutcome {
    match command {
        ConsoleCommand::List => {
            let sessions = relay.sessions().await;
            if sessions.is_empty() {
                return CommandOutcome::reply("no agents online");
            }
            let now = SystemTime::now();
            let lines: Vec<String> = sessions
                .iter()
                .map(|s| {
                    let secs = now.duration_since(s.admitted_at).map_or(0, |d| d.as_secs());
                    format!("{:<16} {:<24} {secs}s", s.display_name, s.address)
                })
                .collect();
            CommandOutcome::reply(lines.join("\n"))
        }
        ConsoleCommand::Bans => {
            let banned = relay.banned().await;
            if banned.is_empty() {
                return CommandOutcome::reply("no bans");
            }
            let lines: Vec<String> = banned.iter().map(ToString::to_string).collect();
            CommandOutcome::reply(lines.join("\n"))
        }
        ConsoleCommand::Kick(name) => match relay.kick(&name).await {
            0 => CommandOutcome::reply(format!("no agent named {name}")),
            n => CommandOutcome::reply(format!("kicked {n} session(s) named {name}")),
        },
        ConsoleCommand::Ban(ip) => {
            let removed = relay.ban(ip).await;
            CommandOutcome {
                reply: format!("banned {ip} ({removed} session(s) removed)"),
                bans_changed: true,
            }
        }
        ConsoleCommand::Unban(ip) => {
            if relay.unban(ip).await {
                CommandOutcome {
                    reply: format!("unbanned {ip}"),
                    bans_changed: true,
                }
            } else {
                CommandOutcome::reply(format!("{ip} was not banned"))
            }
        }
        ConsoleCommand::Say(text) => {
            relay.broadcast_system(&text).await;
            CommandOutcome::reply("sent")
        }
        ConsoleCommand::Help => CommandOutcome::reply(HELP),
    }
}

/// Reads commands from stdin until it closes.
///
/// `persist_bans` is called with the full ban list whenever it changes.
pub async fn run_console<F>(relay: Arc<Relay>, mut persist_bans: F)
where
    F: FnMut(&[IpAddr]) + Send,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("moderator console ready; type `help`");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("console input failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Ok(command) => {
                let outcome = execute(command, &relay).await;
                println!("{}", outcome.reply);
                if outcome.bans_changed {
                    persist_bans(&relay.banned().await);
                }
            }
            Err(usage) => println!("{usage}"),
        }
    }
    info!("console input closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::relay::RelaySettings;
    use shield_core::domain::ModerationPolicy;
    use shield_core::protocol::Envelope;

    fn relay() -> Relay {
        Relay::new(
            Envelope::sealed("ALPHA-77").unwrap(),
            RelaySettings::default(),
            ModerationPolicy::new(),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("list"), Ok(ConsoleCommand::List));
        assert_eq!(ConsoleCommand::parse("  BANS "), Ok(ConsoleCommand::Bans));
        assert_eq!(
            ConsoleCommand::parse("kick AGENT_7"),
            Ok(ConsoleCommand::Kick("AGENT_7".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("ban 10.0.0.9"),
            Ok(ConsoleCommand::Ban("10.0.0.9".parse().unwrap()))
        );
        assert_eq!(
            ConsoleCommand::parse("say  regroup at dawn "),
            Ok(ConsoleCommand::Say("regroup at dawn".into()))
        );
    }

    #[test]
    fn test_parse_rejects_missing_or_bad_arguments() {
        assert!(ConsoleCommand::parse("kick").is_err());
        assert!(ConsoleCommand::parse("ban somewhere").is_err());
        assert!(ConsoleCommand::parse("launch").is_err());
    }

    #[tokio::test]
    async fn test_ban_and_unban_report_persistence() {
        let relay = relay();
        let ip: IpAddr = "10.0.0.9".parse().unwrap();

        let banned = execute(ConsoleCommand::Ban(ip), &relay).await;
        assert!(banned.bans_changed);
        assert_eq!(execute(ConsoleCommand::Bans, &relay).await.reply, "10.0.0.9");

        let lifted = execute(ConsoleCommand::Unban(ip), &relay).await;
        assert!(lifted.bans_changed);

        let again = execute(ConsoleCommand::Unban(ip), &relay).await;
        assert!(!again.bans_changed);
    }

    #[tokio::test]
    async fn test_kick_unknown_name_and_empty_list() {
        let relay = relay();
        assert_eq!(
            execute(ConsoleCommand::Kick("ghost".into()), &relay).await.reply,
            "no agent named ghost"
        );
        assert_eq!(execute(ConsoleCommand::List, &relay).await.reply, "no agents online");
    }
}
