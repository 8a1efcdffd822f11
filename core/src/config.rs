//! Runtime config. Loaded once from config.yaml at startup, validated, and then passed
//! explicitly into each component. There is no global instance.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Channel identifier as the transport reports it (bare id, no Bot API `-100` prefix).
pub type ChannelId = i64;

/// On-disk layout of config.yaml. Every section is optional here; `Config::from_file_config`
/// decides what is required.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    telegram: TelegramSection,
    subscription_api: SubscriptionSection,
    features: FeaturesSection,
    monitor: MonitorSection,
    filters: FiltersSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TelegramSection {
    bot_token: Option<String>,
    proxy: Option<String>,
    api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubscriptionSection {
    host: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeaturesSection {
    fetch_history_enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MonitorSection {
    channels: Vec<ChannelId>,
    whitelist_channels: Vec<ChannelId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FiltersSection {
    keywords: Vec<String>,
    content_filter: Vec<String>,
    link_blacklist: Vec<String>,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub subscription: SubscriptionConfig,
    pub filter: FilterConfig,
    /// Case-insensitive substrings; a link containing any of them is dropped.
    pub link_blacklist: Vec<String>,
    /// Channels to backfill, in configured order. Same ids as `filter.allowed_channels`.
    pub monitored_channels: Vec<ChannelId>,
    pub fetch_history_enabled: bool,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Outbound proxy for all Telegram traffic (e.g. socks5://127.0.0.1:1080).
    pub proxy: Option<String>,
    /// Bot API server; `None` means the public one.
    pub api_url: Option<reqwest::Url>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("proxy", &self.proxy)
            .field("api_url", &self.api_url.as_ref().map(|u| u.as_str()))
            .finish()
    }
}

#[derive(Clone)]
pub struct SubscriptionConfig {
    /// `host:port`, or a full base URL when a scheme is given.
    pub host: String,
    pub api_key: String,
}

impl std::fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("host", &self.host)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Inputs of the message filter.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Empty means every channel is eligible.
    pub allowed_channels: HashSet<ChannelId>,
    /// Channels exempt from the content-filter stage.
    pub whitelist: HashSet<ChannelId>,
    /// Matched case-insensitively.
    pub keywords: Vec<String>,
    /// Matched case-sensitively, only for non-whitelisted channels.
    pub content_filter: Vec<String>,
}

impl Config {
    /// Parse config from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_yaml::from_str(text)?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let bot_token = required(file.telegram.bot_token, "telegram.bot_token")?;
        let host = required(file.subscription_api.host, "subscription_api.host")?;
        let api_key = required(file.subscription_api.api_key, "subscription_api.api_key")?;
        let proxy = file
            .telegram
            .proxy
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let api_url = file
            .telegram
            .api_url
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| {
                reqwest::Url::parse(&s).map_err(|e| ConfigError::Invalid {
                    field: "telegram.api_url",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let filter = FilterConfig {
            allowed_channels: file.monitor.channels.iter().copied().collect(),
            whitelist: file.monitor.whitelist_channels.iter().copied().collect(),
            keywords: non_blank(file.filters.keywords),
            content_filter: non_blank(file.filters.content_filter),
        };

        Ok(Config {
            telegram: TelegramConfig { bot_token, proxy, api_url },
            subscription: SubscriptionConfig { host, api_key },
            filter,
            link_blacklist: non_blank(file.filters.link_blacklist),
            monitored_channels: dedup_in_order(file.monitor.channels),
            fetch_history_enabled: file.features.fetch_history_enabled,
        })
    }

    /// Copy of this config with history backfill forced on or off (CLI override).
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.fetch_history_enabled = enabled;
        self
    }

    /// Log what will be watched. Never logs secrets.
    pub fn log_summary(&self) {
        if self.monitored_channels.is_empty() {
            tracing::info!("watching all channels");
        } else {
            tracing::info!(channels = ?self.monitored_channels, "watching configured channels");
        }
        tracing::info!(
            keywords = self.filter.keywords.len(),
            content_filter_terms = self.filter.content_filter.len(),
            whitelist = self.filter.whitelist.len(),
            link_blacklist = self.link_blacklist.len(),
            fetch_history = self.fetch_history_enabled,
            "config loaded"
        );
    }
}

/// Read and validate config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_yaml_str(&text)
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing(field))
}

/// Blank terms would match every message or every link; drop them.
fn non_blank(terms: Vec<String>) -> Vec<String> {
    terms.into_iter().filter(|t| !t.trim().is_empty()).collect()
}

fn dedup_in_order(ids: Vec<ChannelId>) -> Vec<ChannelId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
telegram:
  bot_token: "123:ABC"
  proxy: "socks5://127.0.0.1:1080"
subscription_api:
  host: "127.0.0.1:8080"
  api_key: "secret"
features:
  fetch_history_enabled: true
monitor:
  channels: [1001, 1002, 1001]
  whitelist_channels: [1002]
filters:
  keywords: ["Sub", ""]
  content_filter: ["投稿", "订阅"]
  link_blacklist: ["t.me"]
"#;

    #[test]
    fn parses_full_config() {
        let cfg = Config::from_yaml_str(FULL).unwrap();
        assert_eq!(cfg.telegram.bot_token, "123:ABC");
        assert_eq!(cfg.telegram.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(cfg.subscription.host, "127.0.0.1:8080");
        assert!(cfg.fetch_history_enabled);
        assert_eq!(cfg.monitored_channels, vec![1001, 1002]);
        assert!(cfg.filter.allowed_channels.contains(&1001));
        assert!(cfg.filter.whitelist.contains(&1002));
        assert_eq!(cfg.filter.keywords, vec!["Sub"]);
        assert_eq!(cfg.link_blacklist, vec!["t.me"]);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let cfg = Config::from_yaml_str(
            "telegram: {bot_token: t}\nsubscription_api: {host: h, api_key: k}\n",
        )
        .unwrap();
        assert!(cfg.filter.allowed_channels.is_empty());
        assert!(cfg.filter.keywords.is_empty());
        assert!(cfg.telegram.proxy.is_none());
        assert!(cfg.telegram.api_url.is_none());
        assert!(!cfg.fetch_history_enabled);
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = Config::from_yaml_str("subscription_api: {host: h, api_key: k}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("telegram.bot_token")));

        let err = Config::from_yaml_str("telegram: {bot_token: t}\nsubscription_api: {host: h}\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("subscription_api.api_key")));
    }

    #[test]
    fn custom_api_url_must_parse() {
        let cfg = Config::from_yaml_str(
            "telegram: {bot_token: t, api_url: 'http://127.0.0.1:8081'}\nsubscription_api: {host: h, api_key: k}\n",
        )
        .unwrap();
        assert_eq!(cfg.telegram.api_url.unwrap().as_str(), "http://127.0.0.1:8081/");

        let err = Config::from_yaml_str(
            "telegram: {bot_token: t, api_url: 'not a url'}\nsubscription_api: {host: h, api_key: k}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "telegram.api_url", .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = Config::from_yaml_str(FULL).unwrap();
        let dump = format!("{:?}", cfg);
        assert!(!dump.contains("123:ABC"));
        assert!(!dump.contains("secret"));
    }

    #[test]
    fn history_override() {
        let cfg = Config::from_yaml_str(FULL).unwrap().with_history(false);
        assert!(!cfg.fetch_history_enabled);
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = load(Path::new("/nonexistent/linkwatch.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
