// src/models/reminder.rs

//! Reminder rules and transition events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Notification channel a reminder is delivered through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    /// Messaging bot push
    Telegram,
    Sms,
    Email,
}

impl ReminderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for ReminderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telegram" => Ok(Self::Telegram),
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            other => Err(AppError::validation(format!(
                "unknown reminder method '{other}'"
            ))),
        }
    }
}

/// Kind of state change a reminder waits for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    OutOfStock,
    BackInStock,
    PriceDrop,
    PriceIncrease,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfStock => "out_of_stock",
            Self::BackInStock => "back_in_stock",
            Self::PriceDrop => "price_drop",
            Self::PriceIncrease => "price_increase",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "out_of_stock" => Ok(Self::OutOfStock),
            "back_in_stock" => Ok(Self::BackInStock),
            "price_drop" => Ok(Self::PriceDrop),
            "price_increase" => Ok(Self::PriceIncrease),
            other => Err(AppError::validation(format!(
                "unknown transition type '{other}'"
            ))),
        }
    }
}

/// A detected change between two consecutive snapshots of one listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionEvent {
    OutOfStock { previous_stock: u32 },
    BackInStock { stock: u32 },
    PriceDrop { previous: f64, current: f64 },
    PriceIncrease { previous: f64, current: f64 },
}

impl TransitionEvent {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::OutOfStock { .. } => TransitionKind::OutOfStock,
            Self::BackInStock { .. } => TransitionKind::BackInStock,
            Self::PriceDrop { .. } => TransitionKind::PriceDrop,
            Self::PriceIncrease { .. } => TransitionKind::PriceIncrease,
        }
    }
}

/// A stored reminder rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    pub id: u64,
    pub method: ReminderMethod,
    pub target_listing_id: String,
    pub transition: TransitionKind,
    /// User whose contact settings receive the notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Reminder {
    /// Whether `other` describes the same (user, method, listing, transition) rule.
    pub fn same_rule(&self, other: &NewReminder) -> bool {
        self.user_id == other.user_id
            && self.method == other.method
            && self.target_listing_id == other.target_listing_id
            && self.transition == other.transition
    }
}

/// A reminder that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewReminder {
    pub method: ReminderMethod,
    pub target_listing_id: String,
    pub transition: TransitionKind,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl NewReminder {
    pub fn new(
        method: ReminderMethod,
        target_listing_id: impl Into<String>,
        transition: TransitionKind,
    ) -> Self {
        Self {
            method,
            target_listing_id: target_listing_id.into(),
            transition,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub(crate) fn into_reminder(self, id: u64) -> Reminder {
        Reminder {
            id,
            method: self.method,
            target_listing_id: self.target_listing_id,
            transition: self.transition,
            user_id: self.user_id,
        }
    }
}

/// Optional criteria for querying reminders. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderFilter {
    pub listing_id: Option<String>,
    pub transition: Option<TransitionKind>,
    pub method: Option<ReminderMethod>,
}

impl ReminderFilter {
    pub fn for_listing(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: Some(listing_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, reminder: &Reminder) -> bool {
        self.listing_id
            .as_deref()
            .is_none_or(|id| id == reminder.target_listing_id)
            && self.transition.is_none_or(|t| t == reminder.transition)
            && self.method.is_none_or(|m| m == reminder.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(
            "out_of_stock".parse::<TransitionKind>().unwrap(),
            TransitionKind::OutOfStock
        );
        assert_eq!(
            "price-drop".parse::<TransitionKind>().unwrap(),
            TransitionKind::PriceDrop
        );
        assert!("sold_out".parse::<TransitionKind>().is_err());
        assert_eq!(
            "Telegram".parse::<ReminderMethod>().unwrap(),
            ReminderMethod::Telegram
        );
    }

    #[test]
    fn test_filter_matches() {
        let reminder = NewReminder::new(ReminderMethod::Sms, "42", TransitionKind::BackInStock)
            .into_reminder(1);

        assert!(ReminderFilter::default().matches(&reminder));
        assert!(ReminderFilter::for_listing("42").matches(&reminder));
        assert!(!ReminderFilter::for_listing("43").matches(&reminder));

        let filter = ReminderFilter {
            transition: Some(TransitionKind::OutOfStock),
            ..ReminderFilter::for_listing("42")
        };
        assert!(!filter.matches(&reminder));
    }

    #[test]
    fn test_same_rule_includes_transition() {
        let stored = NewReminder::new(ReminderMethod::Email, "1", TransitionKind::PriceDrop)
            .into_reminder(7);
        assert!(stored.same_rule(&NewReminder::new(
            ReminderMethod::Email,
            "1",
            TransitionKind::PriceDrop
        )));
        assert!(!stored.same_rule(&NewReminder::new(
            ReminderMethod::Email,
            "1",
            TransitionKind::PriceIncrease
        )));
    }

    #[test]
    fn test_same_rule_includes_user() {
        let alice = NewReminder::new(ReminderMethod::Email, "1", TransitionKind::PriceDrop)
            .for_user("alice");
        let stored = alice.clone().into_reminder(7);
        assert!(stored.same_rule(&alice));
        assert!(!stored.same_rule(
            &NewReminder::new(ReminderMethod::Email, "1", TransitionKind::PriceDrop)
                .for_user("bob")
        ));
        assert!(!stored.same_rule(&NewReminder::new(
            ReminderMethod::Email,
            "1",
            TransitionKind::PriceDrop
        )));
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let json = serde_json::to_value(TransitionEvent::BackInStock { stock: 3 }).unwrap();
        assert_eq!(json["kind"], "back_in_stock");
        assert_eq!(json["stock"], 3);
    }
}
