//! YAML configuration.
//!
//! The file is looked up at `--config`, then `$TICKWISE_CONFIG`, then
//! `$TICKWISE_HOME/config.yml`, then `~/.tickwise/config.yml`. Every section
//! is optional. [`AppConfig::validate`] checks the whole file up front so a
//! bad value fails the run before anything is fetched.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CachePolicy, Category, CategoryPolicy};
use crate::monitor::{parse_rules, ThresholdRule};
use crate::notify::{NotificationSettings, DEFAULT_TEMPLATE};
use crate::provider::YahooConfig;
use crate::retry::RetryConfig;
use crate::ConfigError;

const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub price_monitor: PriceMonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to `<tickwise home>/cache`.
    pub directory: Option<PathBuf>,
    pub policies: BTreeMap<Category, CategoryPolicyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPolicyConfig {
    /// Falls back to the category default when omitted.
    pub ttl_hours: Option<u32>,
    pub enabled: bool,
}

impl Default for CategoryPolicyConfig {
    fn default() -> Self {
        Self {
            ttl_hours: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub requests_per_second: u32,
    pub workers: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_ms: 250,
            requests_per_second: 4,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceMonitorConfig {
    pub enabled: bool,
    pub thresholds: Vec<String>,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub template: String,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub telegram: TelegramConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            template: DEFAULT_TEMPLATE.to_owned(),
            max_attempts: 3,
            timeout_ms: 10_000,
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    /// Token and chat id, preferring the file and falling back to
    /// `TICKWISE_TELEGRAM_BOT_TOKEN` / `TICKWISE_TELEGRAM_CHAT_ID`.
    pub fn credentials(&self) -> Option<(String, String)> {
        let token = non_empty(self.bot_token.clone())
            .or_else(|| non_empty(std::env::var("TICKWISE_TELEGRAM_BOT_TOKEN").ok()))?;
        let chat_id = non_empty(self.chat_id.clone())
            .or_else(|| non_empty(std::env::var("TICKWISE_TELEGRAM_CHAT_ID").ok()))?;
        Some((token, chat_id))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load from the first location that applies. A missing file at an
    /// implicit location yields defaults; an explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match resolve_config_path(explicit, |key| std::env::var_os(key)) {
            ConfigSource::Explicit(path) => Ok((Self::load_from(&path)?, Some(path))),
            ConfigSource::Implicit(path) if path.is_file() => {
                Ok((Self::load_from(&path)?, Some(path)))
            }
            ConfigSource::Implicit(_) => Ok((Self::default(), None)),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every value that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache_policy()?;
        self.threshold_rules()?;

        let provider = &self.provider;
        if provider.timeout_ms == 0 {
            return Err(ConfigError::NonPositive {
                field: "provider.timeout_ms",
            });
        }
        if provider.requests_per_second == 0 {
            return Err(ConfigError::NonPositive {
                field: "provider.requests_per_second",
            });
        }
        if provider.workers == 0 {
            return Err(ConfigError::NonPositive {
                field: "provider.workers",
            });
        }

        let notifications = &self.price_monitor.notifications;
        if notifications.max_attempts == 0 {
            return Err(ConfigError::NonPositive {
                field: "price_monitor.notifications.max_attempts",
            });
        }
        if notifications.timeout_ms == 0 {
            return Err(ConfigError::NonPositive {
                field: "price_monitor.notifications.timeout_ms",
            });
        }
        if !notifications.template.contains("{triggered_count}")
            && !notifications.template.contains("{details}")
        {
            return Err(ConfigError::EmptyTemplate);
        }
        Ok(())
    }

    pub fn cache_policy(&self) -> Result<CachePolicy, ConfigError> {
        let overrides: BTreeMap<Category, CategoryPolicy> = self
            .cache
            .policies
            .iter()
            .map(|(category, entry)| {
                let ttl_hours = entry
                    .ttl_hours
                    .unwrap_or_else(|| category.default_ttl_hours());
                (*category, CategoryPolicy::new(ttl_hours, entry.enabled))
            })
            .collect();
        CachePolicy::from_overrides(&overrides)
    }

    pub fn cache_directory(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(|| resolve_tickwise_home().join("cache"))
    }

    pub fn threshold_rules(&self) -> Result<Vec<ThresholdRule>, ConfigError> {
        parse_rules(&self.price_monitor.thresholds)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::exponential(
            Duration::from_millis(self.provider.backoff_ms),
            self.provider.max_retries,
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.provider.timeout_ms)
    }

    pub fn yahoo(&self) -> YahooConfig {
        YahooConfig {
            timeout: self.attempt_timeout(),
            requests_per_second: self.provider.requests_per_second,
        }
    }

    pub fn notification_settings(&self) -> NotificationSettings {
        let notifications = &self.price_monitor.notifications;
        NotificationSettings {
            enabled: notifications.enabled,
            template: notifications.template.clone(),
            max_attempts: notifications.max_attempts,
            timeout: Duration::from_millis(notifications.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    Explicit(PathBuf),
    Implicit(PathBuf),
}

fn resolve_config_path(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<OsString>,
) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Explicit(path.to_path_buf());
    }
    if let Some(path) = env("TICKWISE_CONFIG").filter(|p| !p.is_empty()) {
        return ConfigSource::Explicit(PathBuf::from(path));
    }
    ConfigSource::Implicit(home_from(env).join(CONFIG_FILE))
}

/// `$TICKWISE_HOME`, else `~/.tickwise`.
pub fn resolve_tickwise_home() -> PathBuf {
    home_from(|key| std::env::var_os(key))
}

fn home_from(env: impl Fn(&str) -> Option<OsString>) -> PathBuf {
    if let Some(path) = env("TICKWISE_HOME").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(home) = env("HOME") {
        return PathBuf::from(home).join(".tickwise");
    }
    PathBuf::from(".tickwise")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AppConfig {
        AppConfig::from_yaml(yaml, Path::new("test.yml")).expect("valid yaml")
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse("");
        assert_eq!(config, AppConfig::default());
        config.validate().expect("defaults are valid");
        let policy = config.cache_policy().expect("default policy");
        assert_eq!(policy.for_category(Category::Dividends).ttl_hours, 24);
        assert_eq!(policy.for_category(Category::CompanyInfo).ttl_hours, 168);
    }

    #[test]
    fn reads_every_section() {
        let config = parse(
            r#"
cache:
  directory: /tmp/tickwise-cache
  policies:
    price_data: { ttl_hours: 2 }
    dividends: { enabled: false }
provider:
  workers: 8
  max_retries: 1
price_monitor:
  enabled: true
  thresholds: ["AAPL:gt:150", "NVDA:eq:500"]
  notifications:
    enabled: true
    max_attempts: 5
    telegram: { bot_token: "t", chat_id: "c" }
logging:
  level: debug
  format: json
"#,
        );
        config.validate().expect("valid config");

        let policy = config.cache_policy().expect("policy");
        assert_eq!(policy.for_category(Category::PriceData).ttl_hours, 2);
        assert!(!policy.is_enabled(Category::Dividends));
        assert_eq!(config.cache_directory(), PathBuf::from("/tmp/tickwise-cache"));
        assert_eq!(config.provider.workers, 8);
        assert_eq!(config.retry().total_attempts(), 2);
        assert_eq!(config.threshold_rules().expect("rules").len(), 2);
        assert_eq!(config.notification_settings().max_attempts, 5);
        assert_eq!(
            config.price_monitor.notifications.telegram.credentials(),
            Some((String::from("t"), String::from("c")))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn zero_ttl_fails_validation() {
        let config = parse("cache:\n  policies:\n    company_info: { ttl_hours: 0 }\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTtl {
                category: "company_info"
            })
        ));
    }

    #[test]
    fn malformed_threshold_fails_validation() {
        let config = parse("price_monitor:\n  thresholds: [\"AAPL>150\"]\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn unknown_category_is_a_parse_error() {
        let err = AppConfig::from_yaml(
            "cache:\n  policies:\n    options_chain: { ttl_hours: 1 }\n",
            Path::new("bad.yml"),
        )
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn template_without_placeholders_is_rejected() {
        let config = parse("price_monitor:\n  notifications:\n    template: hello\n");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyTemplate)));
    }

    #[test]
    fn lookup_order_prefers_flag_then_env_then_home() {
        let env = |vars: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| OsString::from(v))
            }
        };

        assert_eq!(
            resolve_config_path(Some(Path::new("/etc/tw.yml")), env(&[("TICKWISE_CONFIG", "/x.yml")])),
            ConfigSource::Explicit(PathBuf::from("/etc/tw.yml"))
        );
        assert_eq!(
            resolve_config_path(None, env(&[("TICKWISE_CONFIG", "/x.yml")])),
            ConfigSource::Explicit(PathBuf::from("/x.yml"))
        );
        assert_eq!(
            resolve_config_path(None, env(&[("TICKWISE_HOME", "/tw"), ("HOME", "/home/u")])),
            ConfigSource::Implicit(PathBuf::from("/tw/config.yml"))
        );
        assert_eq!(
            resolve_config_path(None, env(&[("HOME", "/home/u")])),
            ConfigSource::Implicit(PathBuf::from("/home/u/.tickwise/config.yml"))
        );
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppConfig::load(Some(&dir.path().join("absent.yml"))).expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn default_notification_settings_match_the_config_default() {
        let from_config = AppConfig::default().notification_settings();
        assert_eq!(from_config, NotificationSettings::default());
        assert!(!from_config.enabled);
    }
}
