use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::i18n::Locale;
use crate::monitoring::uptime::UptimeMode;
use crate::monitoring::validation::MIN_INTERVAL_SECONDS;

/// Environment variable that overrides `telegram.bot_token`
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("Failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No config path available: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub monitoring: MonitoringConfig,
    pub session: SessionConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Empty disables Telegram; replies and alerts are then only logged
    pub bot_token: String,
    pub api_base: String,
    pub poll_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub min_interval_seconds: u64,
    pub uptime_mode: UptimeMode,
    pub default_locale: Locale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_seconds: u64,
    pub max_login_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub history_days: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: path::PathBuf::from("upbeat.db"), max_connections: 8 }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".into(),
            poll_timeout_seconds: 30,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: MIN_INTERVAL_SECONDS,
            uptime_mode: UptimeMode::default(),
            default_locale: Locale::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { idle_timeout_seconds: 3600, max_login_attempts: 3 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { history_days: 30 }
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

/// Get default config path ($XDG_CONFIG_HOME/upbeat/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("upbeat/config.toml"))
}

fn redact(token: &str) -> String {
    match token.len() {
        0 => "(not set)".into(),
        n if n <= 8 => "****".into(),
        _ => format!("{}****", token.chars().take(4).collect::<String>()),
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

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Telegram")?;
        write_1(f, "Bot Token", &redact(&self.telegram.bot_token))?;
        write_1(f, "API Base", &self.telegram.api_base)?;
        write_1(f, "Poll Timeout (s)", &self.telegram.poll_timeout_seconds)?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Min Interval (s)", &self.monitoring.min_interval_seconds)?;
        write_1(f, "Uptime Mode", &format!("{:?}", self.monitoring.uptime_mode).to_lowercase())?;
        write_1(f, "Default Locale", &self.monitoring.default_locale)?;
        write_title_1(f, "Session")?;
        write_1(f, "Idle Timeout (s)", &self.session.idle_timeout_seconds)?;
        write_1(f, "Max Login Attempts", &self.session.max_login_attempts)?;
        write_title_1(f, "Retention")?;
        write_1(f, "History (days)", &self.retention.history_days)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upbeat/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// `TELEGRAM_BOT_TOKEN` takes precedence over the file's token.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            config
        };

        if let Ok(token) = env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.telegram.bot_token = token.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}
