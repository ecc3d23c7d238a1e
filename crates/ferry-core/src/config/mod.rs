//! Configuration management for Ferry.
//!
//! This module handles loading, saving, and validating Ferry configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/ferry/config.toml` |
//! | macOS | `~/Library/Application Support/com.ferry.Ferry/config.toml` |
//! | Windows | `%APPDATA%\ferry\Ferry\config\config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [node]
//! self_address = "0.0.0.0"
//! peer_address = "10.0.0.2"
//! port = 8000
//!
//! [storage]
//! root = "./uploads"
//! received_prefix = "received_"
//!
//! [transfer]
//! transport = "framed"
//! connect_timeout = "10s"
//! io_timeout = "2m"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Ferry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node addressing
    pub node: NodeConfig,
    /// Storage root settings
    pub storage: StorageConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
}

/// Node addressing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name used in logs and pulled-file prefixes
    pub name: String,
    /// Address this node listens on
    pub self_address: String,
    /// Address of the peer node, with or without a port
    pub peer_address: Option<String>,
    /// Listening port, also the peer's port when its address has none
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: hostname::get().map_or_else(
                |_| "ferry".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            self_address: "0.0.0.0".to_string(),
            peer_address: None,
            port: crate::DEFAULT_PORT,
        }
    }
}

/// Storage root options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory served and written to
    pub root: PathBuf,
    /// Prefix for files received in peer mode
    pub received_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            received_prefix: "received_".to_string(),
        }
    }
}

/// Wire form for pushes: `upload`, `send` and both sides of peer mode.
///
/// Calls that need replies (download, list, delete, sync) always use the
/// framed protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Framed protocol with all four calls
    #[default]
    Framed,
    /// Raw length-prefixed push, upload only
    Raw,
}

/// Transfer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Wire form for pushes and peer listeners
    pub transport: Transport,
    /// Chunk size for outgoing transfers
    pub chunk_size: usize,
    /// Give up connecting after this long
    #[serde(with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Duration>,
    /// Give up on a single frame read or write after this long
    #[serde(with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub io_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Framed,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            connect_timeout: Some(Duration::from_secs(10)),
            io_timeout: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {e}", path.display())))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > crate::MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig {
                key: "transfer.chunk_size".to_string(),
                reason: format!("must be between 1 and {}", crate::MAX_CHUNK_SIZE),
            });
        }

        if self.node.port == 0 {
            return Err(Error::InvalidConfig {
                key: "node.port".to_string(),
                reason: "must not be 0".to_string(),
            });
        }

        if self.storage.received_prefix.contains(['/', '\\']) {
            return Err(Error::InvalidConfig {
                key: "storage.received_prefix".to_string(),
                reason: "must not contain a path separator".to_string(),
            });
        }

        Ok(())
    }

    /// `self_address:port`, the address to listen on.
    #[must_use]
    pub fn listen_endpoint(&self) -> String {
        join_host_port(&self.node.self_address, self.node.port)
    }

    /// Address of the peer, with the node port appended when it has none.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no peer address is configured.
    pub fn peer_endpoint(&self) -> Result<String> {
        let peer = self
            .node
            .peer_address
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                key: "node.peer_address".to_string(),
                reason: "no peer configured".to_string(),
            })?;

        Ok(with_default_port(peer, self.node.port))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ferry", "Ferry")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

/// `addr` as given if it names a port, else `addr` joined with `port`.
///
/// Bare IPv6 addresses such as `::1` get bracketed.
#[must_use]
pub fn with_default_port(addr: &str, port: u16) -> String {
    if addr.parse::<std::net::SocketAddr>().is_ok() || has_port(addr) {
        addr.to_string()
    } else {
        join_host_port(addr, port)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn has_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && (!host.contains(':') || host.ends_with(']'))
                && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

mod humantime_serde {
    use std::time::Duration;

    fn parse(s: &str) -> Result<Duration, String> {
        let (digits, millis_per_unit) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 1)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1_000)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60_000)
        } else {
            return Err(format!("invalid duration format: {s}"));
        };

        let count: u64 = digits.parse().map_err(|e| format!("{e}: {s}"))?;
        count
            .checked_mul(millis_per_unit)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration out of range: {s}"))
    }

    fn format(duration: Duration) -> String {
        if duration.subsec_millis() != 0 {
            format!("{}ms", duration.as_millis())
        } else {
            format!("{}s", duration.as_secs())
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_str(&super::format(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
