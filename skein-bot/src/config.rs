//! Bot configuration.
//!
//! Configuration lives in a JSON file at `~/.skein/config.json`. Every
//! field has a default, so a partial file is valid.

use crate::error::{ConfigError, ConfigResult};
use crate::services::irc::line::is_channel_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default capacity of a service's outbound message stream.
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// IRC transport settings.
    pub irc: IrcConfig,
}

/// IRC transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    /// Server address as `host[:port]`.
    pub host: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Reply sent to CTCP VERSION requests.
    pub version: String,
    /// Channels joined on every successful connect, in order.
    pub channels: Vec<String>,
    /// Capacity of the outbound message stream.
    pub queue_capacity: usize,
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            nick: "skein".to_string(),
            user: "skein".to_string(),
            realname: "Skein".to_string(),
            version: "Skein".to_string(),
            channels: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl IrcConfig {
    /// Create a config for `host` with the given nick and channels.
    pub fn new(
        host: impl Into<String>,
        nick: impl Into<String>,
        channels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            host: host.into(),
            nick: nick.into(),
            channels: channels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the outbound stream capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub const fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Reconnect policy applied after a lost link or a failed dial.
///
/// The defaults retry immediately and forever. A non-zero
/// `initial_delay_ms` turns on exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per consecutive failure.
    pub backoff_factor: f64,
    /// Consecutive failures tolerated before giving up. `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Retry with exponential backoff starting at `initial`.
    #[must_use]
    pub fn backoff(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay_ms: u64::try_from(initial.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Limit the number of consecutive failures.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay to wait before the next attempt, given the number of
    /// consecutive failures so far.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to [0, max_delay_ms]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let millis = (self.initial_delay_ms as f64) * self.backoff_factor.max(1.0).powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether the policy gives up after this many consecutive failures.
    #[must_use]
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures > max)
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// The bot cannot run with this value.
    Error,
    /// The bot runs, but probably not as intended.
    Warning,
}

/// A problem found by [`BotConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            IssueLevel::Error => "error",
            IssueLevel::Warning => "warning",
        };
        write!(f, "{level}: {}: {}", self.field, self.message)
    }
}

impl BotConfig {
    /// Check the configuration for values the bot cannot use.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let irc = &self.irc;

        if irc.host.trim().is_empty() {
            issues.push(ConfigIssue::error("irc.host", "server host is empty"));
        }
        if irc.nick.is_empty() {
            issues.push(ConfigIssue::error("irc.nick", "nickname is empty"));
        } else if irc.nick.contains(char::is_whitespace) {
            issues.push(ConfigIssue::error("irc.nick", "nickname contains whitespace"));
        }
        if irc.queue_capacity == 0 {
            issues.push(ConfigIssue::error(
                "irc.queue_capacity",
                "capacity must be at least 1",
            ));
        }
        for channel in &irc.channels {
            if !is_channel_name(channel) {
                issues.push(ConfigIssue::warning(
                    "irc.channels",
                    format!("{channel:?} does not look like a channel name"),
                ));
            }
        }
        if irc.reconnect.backoff_factor < 1.0 {
            issues.push(ConfigIssue::warning(
                "irc.reconnect.backoff_factor",
                "factors below 1.0 are treated as 1.0",
            ));
        }
        if irc.reconnect.max_attempts == Some(0) {
            issues.push(ConfigIssue::warning(
                "irc.reconnect.max_attempts",
                "the bot stops after the first failed connection",
            ));
        }

        issues
    }

    /// Whether [`validate`](Self::validate) found any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|issue| issue.level == IssueLevel::Error)
    }
}

/// Directory holding skein's files.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skein")
}

/// Default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default path.
pub async fn load_config() -> ConfigResult<BotConfig> {
    load_config_from(&config_path()).await
}

/// Load configuration from `path`.
pub async fn load_config_from(path: &Path) -> ConfigResult<BotConfig> {
    debug!(path = %path.display(), "loading config");
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Save configuration to the default path.
pub async fn save_config(config: &BotConfig) -> ConfigResult<()> {
    save_config_to(config, &config_path()).await
}

/// Save configuration to `path`, creating parent directories.
pub async fn save_config_to(config: &BotConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Write a default configuration file and return its path.
pub async fn init_config() -> ConfigResult<PathBuf> {
    let path = config_path();
    save_config_to(&BotConfig::default(), &path).await?;
    Ok(path)
}

/// Read a config file, failing with [`ConfigError::Missing`] when absent.
pub async fn require_config(path: &Path) -> ConfigResult<BotConfig> {
    if !path.exists() {
        return Err(ConfigError::missing(path.display().to_string()));
    }
    load_config_from(path).await
}
