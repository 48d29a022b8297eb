//! TOML-based configuration persistence for HQ.
//!
//! Reads and writes [`HqConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\ShieldRelay\hq.toml`
//! - Linux:    `~/.config/shield-relay/hq.toml`
//! - macOS:    `~/Library/Application Support/ShieldRelay/hq.toml`
//!
//! Example:
//!
//! ```toml
//! [hq]
//! log_level = "info"
//! password = "ALPHA-77"
//! adopt_client_names = true
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 9000
//!
//! [moderation]
//! banned = ["203.0.113.7"]
//! ```
//!
//! Every field has a default, so a missing file or a file with only some
//! sections still loads.  The `banned` list is written back whenever the
//! moderator changes the ban set from the console.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::net::DEFAULT_PORT;
use shield_core::protocol::HandshakeConfig;

use crate::application::relay::RelaySettings;

/// File name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "hq.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level HQ configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HqConfig {
    #[serde(default)]
    pub hq: HqSection,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

/// General HQ behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HqSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Shared password.  May instead come from `--password` or
    /// `SHIELD_PASSWORD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Send frames unsealed.  Debugging only: no authentication at all.
    #[serde(default)]
    pub insecure_plaintext: bool,
    /// Use names offered in `AUTH_ACK:<name>`.
    #[serde(default = "default_true")]
    pub adopt_client_names: bool,
}

/// Listener and timing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Beacons sent before a silent peer is dropped.
    #[serde(default = "default_beacon_attempts")]
    pub beacon_attempts: u32,
    /// Wait for a reply after each beacon.
    #[serde(default = "default_beacon_interval_ms")]
    pub beacon_interval_ms: u64,
    /// Bound on one relay write to one recipient.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Persisted moderation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModerationConfig {
    /// Banned source addresses, as text.
    #[serde(default)]
    pub banned: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_beacon_attempts() -> u32 {
    15
}
fn default_beacon_interval_ms() -> u64 {
    1500
}
fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for HqSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            password: None,
            insecure_plaintext: false,
            adopt_client_names: default_true(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            beacon_attempts: default_beacon_attempts(),
            beacon_interval_ms: default_beacon_interval_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl HqConfig {
    /// Acceptor timings.  The session ceiling only matters to initiators.
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            beacon_attempts: self.network.beacon_attempts,
            beacon_interval: Duration::from_millis(self.network.beacon_interval_ms),
            ..HandshakeConfig::default()
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            write_timeout: Duration::from_millis(self.network.write_timeout_ms),
            adopt_client_names: self.hq.adopt_client_names,
        }
    }

    /// Parses the persisted ban list.  Entries that are not IP addresses are
    /// returned separately so the caller can log them.
    pub fn banned_addresses(&self) -> (Vec<IpAddr>, Vec<String>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for entry in &self.moderation.banned {
            match entry.trim().parse::<IpAddr>() {
                Ok(ip) => valid.push(ip),
                Err(_) => invalid.push(entry.clone()),
            }
        }
        (valid, invalid)
    }

    pub fn set_banned(&mut self, banned: &[IpAddr]) {
        self.moderation.banned = banned.iter().map(ToString::to_string).collect();
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads [`HqConfig`] from `path`, returning defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HqConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HqConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &HqConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
pub(crate) fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ShieldRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("shield-relay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ShieldRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
