//! Client configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/peerdrop/peerdrop.toml`
//! - Windows: `%APPDATA%/peerdrop/peerdrop.toml`
//!
//! `--config <path>` points at another file.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use peerdrop_peer::PeerConfig;
use peerdrop_protocol::constants::{DEFAULT_ACK_TIMEOUT, DEFAULT_ACK_WINDOW};
use peerdrop_protocol::{CHUNK_SIZE, MAX_FILE_SIZE};
use peerdrop_transfer::{ResumeMode, SendOptions};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name announced to the remote peer (hostname by default).
    #[serde(default = "default_username")]
    pub username: String,

    /// Bytes per chunk when sending.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest file that may be sent or received.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Unacknowledged chunks allowed in flight (0 = no acks).
    #[serde(default = "default_ack_window")]
    pub ack_window: usize,

    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// Where received files and partial transfers are stored.
    #[serde(default = "default_resume_dir")]
    pub resume_dir: PathBuf,

    /// What to do with a partial transfer of the same file.
    #[serde(default)]
    pub resume_mode: ResumeMode,

    /// Listen address for `offer` (port 0 = auto-assign).
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Address published in the connection description instead of the
    /// detected one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<SocketAddr>,
}

fn default_username() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "peerdrop".into())
}

fn default_chunk_size() -> usize {
    CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_ack_window() -> usize {
    DEFAULT_ACK_WINDOW
}

fn default_ack_timeout_secs() -> u64 {
    DEFAULT_ACK_TIMEOUT.as_secs()
}

fn default_resume_dir() -> PathBuf {
    data_dir().join("incoming")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: default_username(),
            chunk_size: default_chunk_size(),
            max_file_size: default_max_file_size(),
            ack_window: default_ack_window(),
            ack_timeout_secs: default_ack_timeout_secs(),
            resume_dir: default_resume_dir(),
            resume_mode: ResumeMode::default(),
            bind_address: default_bind_address(),
            advertise_address: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            config
                .send_options()
                .validate()
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            chunk_size: self.chunk_size,
            max_file_size: self.max_file_size,
            ack_window: self.ack_window,
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
        }
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            username: self.username.clone(),
            send: self.send_options(),
            resume_mode: self.resume_mode,
            store_dir: Some(self.resume_dir.clone()),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("peerdrop")
            .join("peerdrop.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("peerdrop").join("peerdrop.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/peerdrop/peerdrop.toml"))
    }
}

/// Returns the platform-specific data directory.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".local").join("share").join("peerdrop")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("peerdrop")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/peerdrop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.username.is_empty());
        assert_eq!(config.chunk_size, 16_384);
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.ack_window, 8);
        assert_eq!(config.ack_timeout_secs, 30);
        assert_eq!(config.resume_mode, ResumeMode::Resume);
        assert_eq!(config.bind_address.port(), 0);
        assert!(config.advertise_address.is_none());
        assert!(config.resume_dir.ends_with("incoming"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            username: "alice".into(),
            chunk_size: 4096,
            ack_window: 0,
            resume_mode: ResumeMode::Restart,
            advertise_address: Some("203.0.113.7:4000".parse().unwrap()),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.chunk_size, 4096);
        assert_eq!(parsed.ack_window, 0);
        assert_eq!(parsed.resume_mode, ResumeMode::Restart);
        assert_eq!(parsed.advertise_address, config.advertise_address);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            username = "bob"
            resume_mode = "restart"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.username, "bob");
        assert_eq!(config.resume_mode, ResumeMode::Restart);
        assert_eq!(config.chunk_size, 16_384);
        assert_eq!(config.ack_window, 8);
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("peerdrop"));
    }

    #[test]
    fn load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("peerdrop.toml");

        let created = Config::load(Some(&path)).unwrap();
        assert!(path.exists());

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.username, created.username);
        assert_eq!(loaded.resume_dir, created.resume_dir);
    }

    #[test]
    fn load_rejects_chunk_size_beyond_message_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("peerdrop.toml");

        std::fs::write(&path, "chunk_size = 16777216\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("chunk size 16777216"));

        std::fs::write(&path, "chunk_size = 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());

        std::fs::write(&path, format!("chunk_size = {}\n", SendOptions::MAX_CHUNK_SIZE)).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.chunk_size, SendOptions::MAX_CHUNK_SIZE);
    }

    #[test]
    fn peer_config_carries_transfer_settings() {
        let config = Config {
            username: "carol".into(),
            ack_timeout_secs: 3,
            ..Config::default()
        };
        let peer = config.peer_config();
        assert_eq!(peer.username, "carol");
        assert_eq!(peer.send.ack_timeout, Duration::from_secs(3));
        assert_eq!(peer.store_dir.as_deref(), Some(config.resume_dir.as_path()));
    }
}
