// src/models/settings.rs

//! Per-user settings stored alongside listings.

use serde::{Deserialize, Serialize};

use crate::models::ReminderMethod;

/// Poll interval used when a user has no stored settings.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 40;

/// Longest accepted poll interval (one year).
pub const MAX_POLL_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Poll interval and notification contacts of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub user_id: String,

    /// Seconds between the end of one cycle and the start of the next
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub phone_number: Option<String>,

    /// Messaging bot chat id
    #[serde(default)]
    pub telegram_user_id: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

impl Settings {
    /// Settings for a user that never saved any.
    pub fn with_defaults(user_id: impl Into<String>, poll_interval_secs: u64) -> Self {
        Self {
            user_id: user_id.into(),
            poll_interval_secs,
            phone_number: None,
            telegram_user_id: None,
            email: None,
        }
    }

    /// Contact address for a notification method, if configured.
    pub fn contact_for(&self, method: ReminderMethod) -> Option<&str> {
        let contact = match method {
            ReminderMethod::Telegram => self.telegram_user_id.as_deref(),
            ReminderMethod::Sms => self.phone_number.as_deref(),
            ReminderMethod::Email => self.email.as_deref(),
        };
        contact.map(str::trim).filter(|c| !c.is_empty())
    }
}
