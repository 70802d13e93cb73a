// src/storage/mod.rs

//! Storage abstractions for listing persistence.
//!
//! The [`HistoryStore`] trait is the single source of truth the engine reads
//! and writes. Concurrent listing tasks only ever touch rows keyed by their own
//! listing id.
//!
//! ## Layout of the local backend
//!
//! ```text
//! {root}/
//! ├── config.toml    # Monitor configuration
//! └── store.json     # Listings, price history, reminders, ownership, settings
//! ```

pub mod local;
mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Listing, NewReminder, PriceHistoryEntry, Reminder, ReminderFilter, Settings, UpsertAction,
};

// Re-export for convenience
pub use local::LocalStore;
pub use state::{OwnershipRemoval, StoreState};

/// Query/command interface of the listing history store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert or update a listing keyed by id. The stored creation time is kept.
    async fn upsert_listing(&self, listing: &Listing) -> Result<UpsertAction>;

    async fn get_listing(&self, id: &str) -> Result<Option<Listing>>;

    async fn get_listing_by_url(&self, url: &str) -> Result<Option<Listing>>;

    /// Every listing currently tracked, newest first.
    async fn get_all_tracked_listings(&self) -> Result<Vec<Listing>>;

    /// Append a price entry. Entries stay readable in timestamp order.
    async fn append_price_history(&self, listing_id: &str, entry: &PriceHistoryEntry)
    -> Result<()>;

    /// Chronological price history of a listing.
    async fn get_price_history(&self, listing_id: &str) -> Result<Vec<PriceHistoryEntry>>;

    async fn get_reminders(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>>;

    /// Store a reminder unless an equivalent (user, method, listing, transition) exists.
    async fn insert_reminder_if_absent(&self, reminder: NewReminder) -> Result<Option<Reminder>>;

    async fn delete_reminder(&self, id: u64) -> Result<bool>;

    async fn get_owners_of(&self, listing_id: &str) -> Result<Vec<String>>;

    /// Link a user to a listing. Returns false when the link already existed.
    async fn add_ownership(&self, user_id: &str, listing_id: &str) -> Result<bool>;

    /// Unlink a user; the listing is hard-deleted when no owner remains.
    async fn remove_ownership(&self, user_id: &str, listing_id: &str) -> Result<OwnershipRemoval>;

    async fn get_settings(&self, user_id: &str) -> Result<Option<Settings>>;

    async fn put_settings(&self, settings: &Settings) -> Result<()>;
}
