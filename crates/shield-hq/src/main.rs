//! Shield Relay HQ entry point.
//!
//! Loads the config file, applies CLI overrides, binds the listener, and runs
//! the accept loop until Ctrl-C.  The moderator console reads stdin in the
//! background.
//!
//! # Usage
//!
//! ```text
//! shield-hq [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Config file [default: platform config dir / hq.toml]
//!   --bind <ADDR>        Bind address (overrides [network] bind_address)
//!   --port <PORT>        Listen port (overrides [network] port)
//!   --password <PASS>    Shared password [env: SHIELD_PASSWORD]
//!   --plaintext          Disable sealing.  Debugging only.
//!   --no-console         Do not read moderator commands from stdin
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load HqConfig          -- file + CLI overrides
//!  └─ Relay::new()           -- envelope, ban list, settings
//!  └─ start services
//!       ├─ moderator console (stdin task)
//!       ├─ Ctrl-C handler    (clears `running`)
//!       └─ run_server        (accept loop, one task per connection)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shield_core::domain::ModerationPolicy;
use shield_core::net::listen;
use shield_core::protocol::Envelope;

use shield_hq::application::relay::Relay;
use shield_hq::infrastructure::console::run_console;
use shield_hq::infrastructure::network::run_server;
use shield_hq::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, HqConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Shield Relay HQ.
#[derive(Debug, Parser)]
#[command(name = "shield-hq", about = "Authenticated broadcast relay for Shield agents", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "SHIELD_HQ_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Shared password.  Overrides the config file.
    #[arg(long, env = "SHIELD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Send and accept unsealed frames.  No authentication at all.
    #[arg(long)]
    plaintext: bool,

    /// Disable the stdin moderator console.
    #[arg(long)]
    no_console: bool,
}

impl Cli {
    /// Applies CLI overrides on top of the file config.
    fn apply(&self, mut cfg: HqConfig) -> HqConfig {
        if let Some(bind) = &self.bind {
            cfg.network.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(password) = &self.password {
            cfg.hq.password = Some(password.clone());
        }
        if self.plaintext {
            cfg.hq.insecure_plaintext = true;
        }
        cfg
    }
}

/// Builds the bind address from the config.
fn bind_addr(cfg: &HqConfig) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = cfg
        .network
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address: '{}'", cfg.network.bind_address))?;
    Ok(SocketAddr::new(ip, cfg.network.port))
}

/// Builds the frame envelope from the config.
fn build_envelope(cfg: &HqConfig) -> anyhow::Result<Envelope> {
    if cfg.hq.insecure_plaintext {
        return Ok(Envelope::Plaintext);
    }
    match cfg.hq.password.as_deref() {
        Some(password) if !password.is_empty() => {
            Envelope::sealed(password).context("failed to derive session key")
        }
        _ => bail!("no password configured: set [hq] password, --password, or SHIELD_PASSWORD"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => config_file_path().ok(),
    };
    let file_cfg = match &config_path {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => HqConfig::default(),
    };
    let cfg = cli.apply(file_cfg.clone());

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.hq.log_level)),
        )
        .init();

    info!("Shield HQ starting");

    let envelope = build_envelope(&cfg)?;
    if !envelope.is_sealed() {
        warn!("PLAINTEXT MODE: frames are unsealed and any peer that answers AUTH_ACK is admitted");
    }

    let (banned, invalid) = cfg.banned_addresses();
    for entry in &invalid {
        warn!("ignoring unparseable ban entry '{entry}'");
    }
    if !banned.is_empty() {
        info!("{} banned address(es) loaded", banned.len());
    }

    let relay = Arc::new(Relay::new(
        envelope,
        cfg.relay_settings(),
        ModerationPolicy::with_bans(banned),
    ));

    let listener = listen(bind_addr(&cfg)?).await?;

    // Shutdown flag shared with the accept loop.
    let running = Arc::new(AtomicBool::new(true));

    // ── Moderator console ─────────────────────────────────────────────────────
    if !cli.no_console {
        let relay = Arc::clone(&relay);
        let mut persisted = file_cfg;
        let path = config_path.clone();
        tokio::spawn(async move {
            run_console(relay, move |bans: &[IpAddr]| {
                let Some(path) = &path else { return };
                persisted.set_banned(bans);
                match save_config_to(path, &persisted) {
                    Ok(()) => info!("ban list saved to {}", path.display()),
                    Err(e) => warn!("could not save ban list: {e}"),
                }
            })
            .await;
        });
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    run_server(listener, relay, cfg.handshake_config(), running).await?;

    info!("Shield HQ stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_overrides_keeps_file_config() {
        let cli = Cli::parse_from(["shield-hq"]);
        let cfg = cli.apply(HqConfig::default());
        assert_eq!(cfg, HqConfig::default());
    }

    #[test]
    fn test_cli_overrides_bind_port_and_password() {
        // Arrange
        let cli = Cli::parse_from([
            "shield-hq",
            "--bind",
            "127.0.0.1",
            "--port",
            "9100",
            "--password",
            "ALPHA-77",
        ]);

        // Act
        let cfg = cli.apply(HqConfig::default());

        // Assert
        assert_eq!(bind_addr(&cfg).unwrap().to_string(), "127.0.0.1:9100");
        assert_eq!(cfg.hq.password.as_deref(), Some("ALPHA-77"));
    }

    #[test]
    fn test_invalid_bind_address_is_an_error() {
        let cli = Cli::parse_from(["shield-hq", "--bind", "not.an.ip"]);
        let cfg = cli.apply(HqConfig::default());
        assert!(bind_addr(&cfg).is_err());
    }

    #[test]
    fn test_missing_password_is_an_error() {
        let mut cfg = HqConfig::default();
        cfg.hq.password = None;
        assert!(build_envelope(&cfg).is_err());
    }

    #[test]
    fn test_plaintext_flag_selects_plaintext_envelope() {
        let cli = Cli::parse_from(["shield-hq", "--plaintext"]);
        let cfg = cli.apply(HqConfig::default());
        assert!(!build_envelope(&cfg).unwrap().is_sealed());
    }

    #[test]
    fn test_password_selects_sealed_envelope() {
        let mut cfg = HqConfig::default();
        cfg.hq.password = Some("ALPHA-77".into());
        assert!(build_envelope(&cfg).unwrap().is_sealed());
    }
}
