use motorwatch_core::MotorId;
use motorwatch_perms::RegistrySettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RootError, RootResult};

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding the reading table.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_database() -> PathBuf {
    dirs_or_default(".motorwatch/readings.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// Where readings come from and how often to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Motor the channel reports for.
    #[serde(default = "default_motor_id")]
    pub motor_id: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_url() -> String {
    "https://api.thingspeak.com/channels/984447/feeds.json".to_string()
}

fn default_motor_id() -> String {
    "m1".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_timeout() -> u64 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            motor_id: default_motor_id(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One entry of the bearer-token user directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub superuser: bool,
    /// Capabilities checked by the policies (`view_readings`, `ingest`).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Motors this user may see individual readings of. Empty means all.
    #[serde(default)]
    pub motors: BTreeSet<String>,
}

/// Top-level configuration for the motorwatch binary.
///
/// Loaded from a TOML file (typically `~/.motorwatch/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    /// Registry-wide permission defaults.
    #[serde(default)]
    pub permissions: RegistrySettings,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        if self.feed.poll_interval_secs == 0 {
            return Err(RootError::Config("poll_interval_secs must be > 0".into()));
        }
        if self.feed.timeout_secs == 0 {
            return Err(RootError::Config("timeout_secs must be > 0".into()));
        }
        if !(self.feed.url.starts_with("http://") || self.feed.url.starts_with("https://")) {
            return Err(RootError::Config(format!(
                "feed url must be http(s), got '{}'",
                self.feed.url
            )));
        }
        MotorId::new(self.feed.motor_id.as_str())?;
        if !self.permissions.login_url.starts_with('/') {
            return Err(RootError::Config(format!(
                "login_url must be an absolute path, got '{}'",
                self.permissions.login_url
            )));
        }

        let mut tokens = BTreeSet::new();
        for user in &self.users {
            if user.name.is_empty() || user.token.is_empty() {
                return Err(RootError::Config(
                    "users need a non-empty name and token".into(),
                ));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(RootError::Config(format!(
                    "token of user '{}' is already assigned",
                    user.name
                )));
            }
        }
        Ok(())
    }

    pub fn motor_id(&self) -> RootResult<MotorId> {
        Ok(MotorId::new(self.feed.motor_id.as_str())?)
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".motorwatch/config.toml")
    }
}
