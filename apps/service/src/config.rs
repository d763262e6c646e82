use std::time::Duration;
use std::{env, fmt, fs, io, path};

use logger::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::MonitorSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("Neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("Invalid logging configuration: {0}")]
    InvalidLogFormat(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: Database,
    pub logging: Logging,
    pub checks: Checks,
    pub notifications: Notifications,
    pub retention: Retention,
    /// Monitors created at startup when no monitor with that name exists
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub monitors: Vec<MonitorSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: path::PathBuf,
    pub pool_size: usize,
    /// Recent checks kept with every monitor in memory
    pub history_limit: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    /// Seconds, used when a monitor has no timeout of its own
    pub default_timeout: u64,
    /// Bytes of response body kept in a check result
    pub body_limit: usize,
    pub user_agent: String,
    /// Container monitors talk to the daemon at `DOCKER_HOST` or the default socket
    pub docker_enabled: bool,
    /// ICMP needs raw or unprivileged datagram sockets
    pub ping_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    /// Seconds
    pub request_timeout: u64,
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    /// Days of check history to keep, 0 keeps everything
    pub check_days: u64,
}

fn user_agent() -> String {
    format!("tocsin/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for Database {
    fn default() -> Self {
        Self { path: default_database_path(), pool_size: 8, history_limit: 100 }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Logging {
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.format.parse().map_err(ConfigError::InvalidLogFormat)
    }
}

impl Default for Checks {
    fn default() -> Self {
        Self {
            default_timeout: 10,
            body_limit: 4096,
            user_agent: user_agent(),
            docker_enabled: true,
            ping_enabled: true,
        }
    }
}

impl Checks {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout.max(1))
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self { request_timeout: 10, user_agent: user_agent() }
    }
}

impl Notifications {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self { check_days: 30 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/tocsin/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("tocsin/config.toml"))
}

/// $XDG_DATA_HOME/tocsin/tocsin.db, or the working directory as a last resort
fn default_database_path() -> path::PathBuf {
    let data_home = env::var("XDG_DATA_HOME")
        .map(path::PathBuf::from)
        .ok()
        .or_else(|| env::home_dir().map(|home| home.join(".local/share")));

    match data_home {
        Some(dir) => dir.join("tocsin/tocsin.db"),
        None => path::PathBuf::from("tocsin.db"),
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_1(f, "History Limit", &self.database.history_limit)?;

        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        write_title_1(f, "Checks")?;
        write_1(f, "Default Timeout (s)", &self.checks.default_timeout)?;
        write_1(f, "Body Limit (bytes)", &self.checks.body_limit)?;
        write_1(f, "User Agent", &self.checks.user_agent)?;
        write_1(f, "Docker Enabled", &self.checks.docker_enabled)?;
        write_1(f, "Ping Enabled", &self.checks.ping_enabled)?;

        write_title_1(f, "Notifications")?;
        write_1(f, "Request Timeout (s)", &self.notifications.request_timeout)?;
        write_1(f, "User Agent", &self.notifications.user_agent)?;

        write_title_1(f, "Retention")?;
        write_1(f, "Check Days", &self.retention.check_days)?;

        write_title_1(f, "Seed Monitors")?;
        for monitor in &self.monitors {
            write_1(f, &monitor.name, &format_args!("{} {}", monitor.connection_type, monitor.connection))?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/tocsin/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            let config: Self = toml::from_str(raw_string.as_str())?;
            config.logging.log_format()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }
}
