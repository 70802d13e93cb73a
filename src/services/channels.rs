// src/services/channels.rs

//! Notification delivery channels.
//!
//! Every channel implements [`NotificationChannel`]. The messaging bot channel
//! talks to the Telegram Bot API; SMS and e-mail delivery only log for now.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{ReminderMethod, TelegramConfig, TransitionKind};

/// A rendered notification ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub method: ReminderMethod,
    /// Channel-specific address; `None` uses the channel default
    pub recipient: Option<String>,
    pub listing_id: String,
    pub transition: TransitionKind,
    pub text: String,
}

/// A delivery capability.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Messaging bot channel backed by the Telegram Bot API.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    default_chat_id: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        default_chat_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            default_chat_id,
        }
    }

    /// Build from configuration; `None` when no bot token is set.
    pub fn from_config(config: &TelegramConfig, client: reqwest::Client) -> Option<Self> {
        let token = config.bot_token.as_deref()?.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self::new(
            client,
            config.api_base.trim_end_matches('/'),
            token,
            config.default_chat_id.clone(),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let chat_id = notification
            .recipient
            .as_deref()
            .or(self.default_chat_id.as_deref())
            .ok_or_else(|| AppError::dispatch(self.name(), "no chat id configured"))?;

        log::info!(
            "Sending telegram reminder for {} ({})",
            notification.listing_id,
            notification.transition
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(&SendMessage {
                chat_id,
                text: &notification.text,
                disable_web_page_preview: false,
            })
            .send()
            .await
            .map_err(|e| AppError::dispatch(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::dispatch(
                self.name(),
                format!("HTTP {status}: {body}"),
            ));
        }
        Ok(())
    }
}

/// Channel that only records the notification in the log.
pub struct LogChannel {
    method: ReminderMethod,
}

impl LogChannel {
    pub fn new(method: ReminderMethod) -> Self {
        Self { method }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        self.method.as_str()
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        log::info!(
            "Sending {} reminder for {} to {}",
            self.method,
            notification.listing_id,
            notification.recipient.as_deref().unwrap_or("<default>")
        );
        log::debug!("{}", notification.text);
        Ok(())
    }
}

/// One channel per reminder method.
#[derive(Clone)]
pub struct ChannelSet {
    telegram: Arc<dyn NotificationChannel>,
    sms: Arc<dyn NotificationChannel>,
    email: Arc<dyn NotificationChannel>,
}

impl ChannelSet {
    pub fn new(
        telegram: Arc<dyn NotificationChannel>,
        sms: Arc<dyn NotificationChannel>,
        email: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            telegram,
            sms,
            email,
        }
    }

    /// Channels that only log.
    pub fn logging() -> Self {
        Self::new(
            Arc::new(LogChannel::new(ReminderMethod::Telegram)),
            Arc::new(LogChannel::new(ReminderMethod::Sms)),
            Arc::new(LogChannel::new(ReminderMethod::Email)),
        )
    }

    /// Real messaging bot when configured, logging channels otherwise.
    pub fn from_config(config: &TelegramConfig, client: reqwest::Client) -> Self {
        let mut channels = Self::logging();
        match TelegramChannel::from_config(config, client) {
            Some(telegram) => channels.telegram = Arc::new(telegram),
            None => log::warn!("TG_BOT_TOKEN not set, telegram reminders will only be logged"),
        }
        channels
    }

    /// Channel for a reminder method.
    pub fn select(&self, method: ReminderMethod) -> &dyn NotificationChannel {
        match method {
            ReminderMethod::Telegram => self.telegram.as_ref(),
            ReminderMethod::Sms => self.sms.as_ref(),
            ReminderMethod::Email => self.email.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(recipient: Option<&str>) -> Notification {
        Notification {
            method: ReminderMethod::Telegram,
            recipient: recipient.map(str::to_string),
            listing_id: "1".to_string(),
            transition: TransitionKind::OutOfStock,
            text: "gone".to_string(),
        }
    }

    #[test]
    fn test_select_by_method() {
        let channels = ChannelSet::logging();
        assert_eq!(channels.select(ReminderMethod::Telegram).name(), "telegram");
        assert_eq!(channels.select(ReminderMethod::Sms).name(), "sms");
        assert_eq!(channels.select(ReminderMethod::Email).name(), "email");
    }

    #[test]
    fn test_telegram_requires_token() {
        let client = reqwest::Client::new();
        assert!(TelegramChannel::from_config(&TelegramConfig::default(), client.clone()).is_none());

        let config = TelegramConfig {
            bot_token: Some("abc".to_string()),
            api_base: "https://api.example.org/".to_string(),
            ..TelegramConfig::default()
        };
        let channel = TelegramChannel::from_config(&config, client).unwrap();
        assert_eq!(channel.endpoint(), "https://api.example.org/botabc/sendMessage");
    }

    #[tokio::test]
    async fn test_telegram_without_chat_fails() {
        let channel = TelegramChannel::new(reqwest::Client::new(), "http://127.0.0.1:1", "t", None);
        let result = channel.send(&notification(None)).await;
        assert!(matches!(result, Err(AppError::Dispatch { .. })));
    }

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        let channel = LogChannel::new(ReminderMethod::Sms);
        assert!(channel.send(&notification(Some("+100"))).await.is_ok());
    }
}
