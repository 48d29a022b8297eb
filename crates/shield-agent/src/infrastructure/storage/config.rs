//! TOML-based configuration persistence for the agent.
//!
//! Reads and writes [`AgentConfig`] to the platform-appropriate config file
//! (`agent.toml` next to HQ's `hq.toml`):
//!
//! ```toml
//! [agent]
//! display_name = "GHOST"
//! log_level = "info"
//!
//! [link]
//! target = "10.0.0.5:9000"
//! connect_timeout_ms = 5000
//! handshake_ceiling_ms = 30000
//! write_timeout_ms = 5000
//! ```
//!
//! The password may live in the file, but `--password` or `SHIELD_PASSWORD`
//! is preferred so it stays out of anything that gets copied around.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::protocol::HandshakeConfig;

/// File name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "agent.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub link: LinkConfig,
}

/// Operator identity and local behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Name put in front of outgoing lines and offered to HQ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Must match HQ's setting.  Debugging only.
    #[serde(default)]
    pub insecure_plaintext: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Where HQ is and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// `host`, `host:port` or `tcp://host:port`.
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on the whole handshake.
    #[serde(default = "default_handshake_ceiling_ms")]
    pub handshake_ceiling_ms: u64,
    /// Bound on one outbound chat or radio write.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_target() -> String {
    "127.0.0.1:9000".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_handshake_ceiling_ms() -> u64 {
    30_000
}
fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            display_name: None,
            log_level: default_log_level(),
            insecure_plaintext: false,
            password: None,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_ceiling_ms: default_handshake_ceiling_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl AgentConfig {
    /// Initiator timings.  The beacon fields only matter to HQ.
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            session_ceiling: Duration::from_millis(self.link.handshake_ceiling_ms),
            ..HandshakeConfig::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.link.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.link.write_timeout_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads [`AgentConfig`] from `path`, returning defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AgentConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AgentConfig::default()),
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
/// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config_to(path: &Path, config: &AgentConfig) -> Result<(), ConfigError> {
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

fn platform_config_dir() -> Option<PathBuf> {
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
