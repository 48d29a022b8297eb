//! Shield Relay agent entry point.
//!
//! # Usage
//!
//! ```text
//! shield-agent [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Config file [default: platform config dir / agent.toml]
//!   --target <ADDR>      HQ address: host, host:port or tcp://host:port
//!   --password <PASS>    Shared password [env: SHIELD_PASSWORD]
//!   --name <NAME>        Display name offered to HQ
//!   --plaintext          Disable sealing.  Must match HQ.  Debugging only.
//!   --no-connect         Start disconnected; use /connect
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load AgentConfig        -- file + CLI overrides
//!  └─ AgentConnection::new()  -- Uplink over sealed TCP
//!  └─ CommsUseCase::new()     -- toggle / chat / radio
//!  └─ input loop
//!       ├─ stdin line  -> AgentCommand -> CommsUseCase
//!       └─ Ctrl-C      -> close link and exit
//! ```
//!
//! Inbound traffic never passes through the input loop: the connection's read
//! task hands decoded messages straight to [`TerminalObserver`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use shield_core::net::resolve_address;
use shield_core::protocol::{Envelope, Message};

use shield_agent::application::comms::{CommsUseCase, LinkObserver, Severity, Uplink};
use shield_agent::infrastructure::network::{AgentConnection, LinkSettings};
use shield_agent::infrastructure::storage::config::{config_file_path, load_config_from, AgentConfig};
use shield_agent::infrastructure::terminal::{AgentCommand, HELP};

/// Sender prefix used when no display name is configured.
const ANONYMOUS_SENDER: &str = "AGENT";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Shield Relay agent.
#[derive(Debug, Parser)]
#[command(name = "shield-agent", about = "Connects to a Shield HQ and relays chat", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "SHIELD_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// HQ address.
    #[arg(long)]
    target: Option<String>,

    /// Shared password.  Overrides the config file.
    #[arg(long, env = "SHIELD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Display name offered to HQ and shown on outgoing lines.
    #[arg(long)]
    name: Option<String>,

    /// Send and accept unsealed frames.
    #[arg(long)]
    plaintext: bool,

    /// Do not connect at startup.
    #[arg(long)]
    no_connect: bool,
}

impl Cli {
    fn apply(&self, mut cfg: AgentConfig) -> AgentConfig {
        if let Some(target) = &self.target {
            cfg.link.target = target.clone();
        }
        if let Some(password) = &self.password {
            cfg.agent.password = Some(password.clone());
        }
        if let Some(name) = &self.name {
            cfg.agent.display_name = Some(name.clone());
        }
        if self.plaintext {
            cfg.agent.insecure_plaintext = true;
        }
        cfg
    }
}

fn build_envelope(cfg: &AgentConfig) -> anyhow::Result<Envelope> {
    if cfg.agent.insecure_plaintext {
        return Ok(Envelope::Plaintext);
    }
    match cfg.agent.password.as_deref() {
        Some(password) if !password.is_empty() => {
            Envelope::sealed(password).context("failed to derive session key")
        }
        _ => bail!("no password configured: set [agent] password, --password, or SHIELD_PASSWORD"),
    }
}

// ── Terminal observer ─────────────────────────────────────────────────────────

/// Prints link events for the operator.
struct TerminalObserver;

impl LinkObserver for TerminalObserver {
    fn on_log(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => println!("{text}"),
            Severity::Success => println!("[ok] {text}"),
            Severity::Warning => println!("[!] {text}"),
            Severity::Error => eprintln!("[x] {text}"),
        }
    }

    fn on_status_changed(&self, connected: bool) {
        info!(connected, "link status changed");
    }

    fn on_message(&self, message: &Message) {
        debug!(?message, "inbound");
        println!("{message}");
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_cfg = match cli.config.clone().or_else(|| config_file_path().ok()) {
        Some(path) => load_config_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AgentConfig::default(),
    };
    let cfg = cli.apply(file_cfg);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.agent.log_level)),
        )
        .init();

    let target = resolve_address(&cfg.link.target)
        .with_context(|| format!("invalid HQ address '{}'", cfg.link.target))?;
    let envelope = build_envelope(&cfg)?;
    if !envelope.is_sealed() {
        warn!("PLAINTEXT MODE: traffic is unsealed and unauthenticated");
    }

    let display_name = cfg.agent.display_name.clone();
    let sender = display_name.clone().unwrap_or_else(|| ANONYMOUS_SENDER.to_string());
    info!("Shield agent starting; HQ at {target}");

    let observer: Arc<dyn LinkObserver> = Arc::new(TerminalObserver);
    let uplink: Arc<dyn Uplink> = Arc::new(AgentConnection::new(
        LinkSettings {
            target,
            connect_timeout: cfg.connect_timeout(),
            handshake: cfg.handshake_config(),
            display_name,
            write_timeout: cfg.write_timeout(),
        },
        envelope,
        Arc::clone(&observer),
    ));
    let comms = CommsUseCase::new(Arc::clone(&uplink), observer, sender);

    if !cli.no_connect {
        // Failure is already on screen; the operator can retry with /connect.
        let _ = comms.toggle_connection().await;
    }
    println!("{HELP}");

    // ── Input loop ────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin failed: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        };

        let command = match AgentCommand::parse(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        let result = match command {
            AgentCommand::Chat(text) => comms.send_chat(&text).await,
            AgentCommand::Radio(text) => comms.send_radio(&text).await,
            AgentCommand::Connect if comms.is_connected() => {
                println!("already connected");
                Ok(())
            }
            AgentCommand::Disconnect if !comms.is_connected() => {
                println!("not connected");
                Ok(())
            }
            AgentCommand::Connect | AgentCommand::Disconnect => {
                comms.toggle_connection().await.map(|_| ())
            }
            AgentCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            AgentCommand::Empty => Ok(()),
            AgentCommand::Quit => break,
        };
        if let Err(e) = result {
            debug!("command failed: {e}");
        }
    }

    uplink.close().await;
    info!("Shield agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
