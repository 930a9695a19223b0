// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::errors::PagecapError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub advance: AdvanceConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// What to monitor and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Channel to monitor. Required for `watch`.
    pub channel: Option<String>,
    /// Display name of the automated responder whose pages are captured.
    pub responder: String,
    pub trigger_prefix: String,
    pub poll_interval_ms: u64,
    /// How many recent messages each poll reads. Triggers buried under more
    /// chatter than this between two polls are missed.
    pub arrival_window: u32,
    /// Never treat bot-flagged authors as triggers.
    pub ignore_bots: bool,
    /// Extra author names or ids that must never start a session.
    pub ignored_authors: Vec<String>,
    pub backoff: BackoffConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel: None,
            responder: "Mudae".into(),
            trigger_prefix: "$".into(),
            poll_interval_ms: 1_000,
            arrival_window: 10,
            ignore_bots: true,
            ignored_authors: Vec::new(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Consecutive failures before the outage is surfaced at error level.
    pub failure_threshold: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            failure_threshold: 10,
        }
    }
}

/// Optional advance-and-confirm paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvanceConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Wait between requesting the next page and re-reading the message.
    pub settle_ms: u64,
    pub reaction: String,
}

impl Default for AdvanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            settle_ms: 1_500,
            reaction: "\u{27A1}\u{FE0F}".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Name of the environment variable holding the bot token.
    pub token_env: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: "DISCORD_BOT_TOKEN".into(),
        }
    }
}

impl DiscordConfig {
    pub fn token(&self) -> Result<String, PagecapError> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PagecapError::MissingToken(self.token_env.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capture directory override; defaults to `<data_dir>/captures`.
    pub dir: Option<String>,
    /// Record sessions in the SQLite ledger.
    pub ledger: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ledger: true,
        }
    }
}

impl StoreConfig {
    pub fn captures_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::captures_dir)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the watcher cannot run with.
    pub fn validate(&self) -> Result<(), PagecapError> {
        if self.watch.trigger_prefix.is_empty() {
            return Err(PagecapError::Config("watch.trigger_prefix is empty".into()));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(PagecapError::Config(
                "watch.poll_interval_ms must be positive".into(),
            ));
        }
        if self.watch.backoff.backoff_factor < 1.0 {
            return Err(PagecapError::Config(
                "watch.backoff.backoff_factor must be >= 1.0".into(),
            ));
        }
        if self.advance.enabled && self.advance.max_attempts == 0 {
            return Err(PagecapError::Config(
                "advance.max_attempts must be positive when advance is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Monitored channel, required by every command that talks to the source.
    pub fn channel(&self) -> Result<&str, PagecapError> {
        self.watch
            .channel
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(PagecapError::NoChannel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.watch.trigger_prefix, "$");
        assert_eq!(c.watch.responder, "Mudae");
        assert_eq!(c.watch.poll_interval(), Duration::from_secs(1));
        assert!(c.watch.ignore_bots);
        assert!(!c.advance.enabled);
        assert_eq!(c.advance.max_attempts, 3);
        assert_eq!(c.discord.token_env, "DISCORD_BOT_TOKEN");
        assert!(c.store.ledger);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.watch.poll_interval_ms, 1_000);
        assert!(config.watch.channel.is_none());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[watch]
channel = "1234"
responder = "Karuta"
trigger_prefix = "k!"
poll_interval_ms = 500
arrival_window = 25
ignored_authors = ["helper-bot"]

[watch.backoff]
max_delay_ms = 10000
failure_threshold = 4

[advance]
enabled = true
max_attempts = 5

[discord]
token_env = "MY_TOKEN"

[store]
dir = "/tmp/captures"
ledger = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.channel().unwrap(), "1234");
        assert_eq!(config.watch.responder, "Karuta");
        assert_eq!(config.watch.trigger_prefix, "k!");
        assert_eq!(config.watch.poll_interval_ms, 500);
        // Unspecified keys inside a present section keep their defaults
        assert!(config.watch.ignore_bots);
        assert_eq!(config.watch.arrival_window, 25);
        assert_eq!(config.watch.ignored_authors, vec!["helper-bot".to_string()]);
        assert_eq!(config.watch.backoff.max_delay_ms, 10_000);
        assert_eq!(config.watch.backoff.failure_threshold, 4);
        assert!((config.watch.backoff.backoff_factor - 2.0).abs() < 0.001);
        assert!(config.advance.enabled);
        assert_eq!(config.advance.max_attempts, 5);
        assert_eq!(config.discord.token_env, "MY_TOKEN");
        assert_eq!(config.store.captures_dir(), PathBuf::from("/tmp/captures"));
        assert!(!config.store.ledger);
    }

    #[test]
    fn test_missing_channel() {
        let c = Config::default();
        assert!(matches!(c.channel(), Err(PagecapError::NoChannel)));

        let mut blank = Config::default();
        blank.watch.channel = Some("  ".into());
        assert!(matches!(blank.channel(), Err(PagecapError::NoChannel)));
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut c = Config::default();
        c.watch.trigger_prefix = String::new();
        assert!(matches!(c.validate(), Err(PagecapError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut c = Config::default();
        c.watch.poll_interval_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_advance_without_attempts() {
        let mut c = Config::default();
        c.advance.enabled = true;
        c.advance.max_attempts = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut config = Config::default();
        config.watch.channel = Some("42".into());
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.watch.channel.as_deref(), Some("42"));
        assert_eq!(deserialized.advance.reaction, config.advance.reaction);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_token_env() {
        let d = DiscordConfig {
            token_env: "PAGECAP_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
        };
        assert!(matches!(d.token(), Err(PagecapError::MissingToken(_))));
    }
}
