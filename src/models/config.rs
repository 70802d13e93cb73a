// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::settings::MAX_POLL_INTERVAL_SECS;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP settings for fetching listings
    #[serde(default)]
    pub source: SourceConfig,

    /// Cycle timing
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// CSS selectors used by the extractor
    #[serde(default)]
    pub extractor: ExtractorSelectors,

    /// Messaging bot credentials
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.telegram.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.telegram.apply_env();
            config
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.max_concurrent == 0 {
            return Err(AppError::validation("source.max_concurrent must be > 0"));
        }
        if self.scheduler.default_interval_secs == 0
            || self.scheduler.default_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(AppError::validation(format!(
                "scheduler.default_interval_secs must be within 1..={MAX_POLL_INTERVAL_SECS}"
            )));
        }
        if self.scheduler.settings_user.trim().is_empty() {
            return Err(AppError::validation("scheduler.settings_user is empty"));
        }
        for (name, selector) in self.extractor.named() {
            if selector.trim().is_empty() {
                return Err(AppError::validation(format!("extractor.{name} is empty")));
            }
        }
        Ok(())
    }
}

/// HTTP client settings for the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum listings processed concurrently within a cycle
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Scheduler timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval used while the settings user has nothing stored
    #[serde(default = "defaults::interval")]
    pub default_interval_secs: u64,

    /// Pause after an unexpected cycle failure
    #[serde(default = "defaults::failure_cooldown")]
    pub failure_cooldown_secs: u64,

    /// User whose poll interval drives the scheduler
    #[serde(default = "defaults::settings_user")]
    pub settings_user: String,

    /// Start the first cycle without waiting a full interval
    #[serde(default = "defaults::run_immediately")]
    pub run_immediately: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: defaults::interval(),
            failure_cooldown_secs: defaults::failure_cooldown(),
            settings_user: defaults::settings_user(),
            run_immediately: defaults::run_immediately(),
        }
    }
}

/// CSS selectors locating listing facts in a fetched document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSelectors {
    #[serde(default = "defaults::title_selector")]
    pub title: String,

    /// Primary price text node
    #[serde(default = "defaults::price_selector")]
    pub price: String,

    /// Availability block
    #[serde(default = "defaults::availability_selector")]
    pub availability: String,

    /// Text nodes inside the availability block checked for "Out of Stock"
    #[serde(default = "defaults::availability_item_selector")]
    pub availability_items: String,

    /// Secondary-styled quantity text inside the availability block
    #[serde(default = "defaults::quantity_selector")]
    pub quantity: String,

    /// One item-specifics row (label and value pair)
    #[serde(default = "defaults::feature_row_selector")]
    pub feature_row: String,

    #[serde(default = "defaults::feature_label_selector")]
    pub feature_label: String,

    #[serde(default = "defaults::feature_value_selector")]
    pub feature_value: String,

    /// Link to the seller's page
    #[serde(default = "defaults::seller_selector")]
    pub seller: String,

    /// Gallery thumbnails
    #[serde(default = "defaults::image_selector")]
    pub image: String,
}

impl ExtractorSelectors {
    pub(crate) fn named(&self) -> [(&'static str, &str); 10] {
        [
            ("title", &self.title),
            ("price", &self.price),
            ("availability", &self.availability),
            ("availability_items", &self.availability_items),
            ("quantity", &self.quantity),
            ("feature_row", &self.feature_row),
            ("feature_label", &self.feature_label),
            ("feature_value", &self.feature_value),
            ("seller", &self.seller),
            ("image", &self.image),
        ]
    }
}

impl Default for ExtractorSelectors {
    fn default() -> Self {
        Self {
            title: defaults::title_selector(),
            price: defaults::price_selector(),
            availability: defaults::availability_selector(),
            availability_items: defaults::availability_item_selector(),
            quantity: defaults::quantity_selector(),
            feature_row: defaults::feature_row_selector(),
            feature_label: defaults::feature_label_selector(),
            feature_value: defaults::feature_value_selector(),
            seller: defaults::seller_selector(),
            image: defaults::image_selector(),
        }
    }
}

/// Messaging bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    /// Bot token; overridden by `TG_BOT_TOKEN`
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat used when a reminder has no per-user contact; overridden by `TG_CHAT_ID`
    #[serde(default)]
    pub default_chat_id: Option<String>,
}

impl TelegramConfig {
    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TG_BOT_TOKEN") {
            self.bot_token = Some(token);
        }
        if let Ok(chat) = std::env::var("TG_CHAT_ID") {
            self.default_chat_id = Some(chat);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::telegram_api_base(),
            bot_token: None,
            default_chat_id: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use crate::models::settings::DEFAULT_POLL_INTERVAL_SECS;

    // Source defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; listing-monitor/0.1)".into()
    }
    pub fn timeout() -> u64 {
        20
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Scheduler defaults
    pub fn interval() -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }
    pub fn failure_cooldown() -> u64 {
        5
    }
    pub fn settings_user() -> String {
        "default".into()
    }
    pub fn run_immediately() -> bool {
        true
    }

    // Extractor defaults
    pub fn title_selector() -> String {
        ".x-item-title__mainTitle".into()
    }
    pub fn price_selector() -> String {
        ".x-bin-price__content .x-price-primary .ux-textspans".into()
    }
    pub fn availability_selector() -> String {
        ".x-quantity__availability".into()
    }
    pub fn availability_item_selector() -> String {
        "span".into()
    }
    pub fn quantity_selector() -> String {
        ".ux-textspans.ux-textspans--SECONDARY".into()
    }
    pub fn feature_row_selector() -> String {
        "dl.ux-labels-values".into()
    }
    pub fn feature_label_selector() -> String {
        "dt.ux-labels-values__labels".into()
    }
    pub fn feature_value_selector() -> String {
        "dd.ux-labels-values__values".into()
    }
    pub fn seller_selector() -> String {
        "div.x-sellercard-atf__info__about-seller a".into()
    }
    pub fn image_selector() -> String {
        "div.ux-image-grid img".into()
    }

    // Telegram defaults
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.source.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.source.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_interval() {
        let mut config = Config::default();
        config.scheduler.default_interval_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_selector() {
        let mut config = Config::default();
        config.extractor.quantity = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            default_interval_secs = 90

            [telegram]
            default_chat_id = "1234"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.default_interval_secs, 90);
        assert_eq!(config.scheduler.failure_cooldown_secs, 5);
        assert_eq!(config.source.max_concurrent, 4);
        assert_eq!(config.extractor.title, ".x-item-title__mainTitle");
        assert_eq!(config.telegram.default_chat_id.as_deref(), Some("1234"));
        assert!(!config.telegram.is_configured());
    }
}
