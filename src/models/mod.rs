// src/models/mod.rs

//! Domain models for the listing monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod listing;
mod reminder;
mod settings;

// Re-export all public types
pub use config::{
    Config, ExtractorSelectors, LoggingConfig, SchedulerConfig, SourceConfig, TelegramConfig,
};
pub use listing::{Listing, ListingDetails, ListingView, PriceHistoryEntry, Snapshot, price_delta};
pub use reminder::{
    NewReminder, Reminder, ReminderFilter, ReminderMethod, TransitionEvent, TransitionKind,
};
pub use settings::{DEFAULT_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, Settings};

/// Whether an upsert created the listing or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Inserted,
    Updated,
}
