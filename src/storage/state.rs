// src/storage/state.rs

//! In-memory state shared by the store backends.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    Listing, NewReminder, PriceHistoryEntry, Reminder, ReminderFilter, Settings, UpsertAction,
};

/// Result of removing an ownership relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipRemoval {
    /// The user did not own the listing
    NotOwned,
    /// Other owners remain; the listing stays
    Released,
    /// The last owner left; listing, history and reminders are gone
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct Ownership {
    user_id: String,
    listing_id: String,
}

/// Complete store contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    listings: BTreeMap<String, Listing>,
    #[serde(default)]
    price_history: BTreeMap<String, Vec<PriceHistoryEntry>>,
    #[serde(default)]
    reminders: Vec<Reminder>,
    #[serde(default)]
    next_reminder_id: u64,
    #[serde(default)]
    ownership: BTreeSet<Ownership>,
    #[serde(default)]
    settings: BTreeMap<String, Settings>,
}

impl StoreState {
    pub fn upsert_listing(&mut self, listing: &Listing) -> UpsertAction {
        match self.listings.get_mut(&listing.id) {
            Some(existing) => {
                existing.title = listing.title.clone();
                existing.url = listing.url.clone();
                existing.stock = listing.stock;
                UpsertAction::Updated
            }
            None => {
                self.listings.insert(listing.id.clone(), listing.clone());
                UpsertAction::Inserted
            }
        }
    }

    pub fn listing(&self, id: &str) -> Option<Listing> {
        self.listings.get(id).cloned()
    }

    pub fn listing_by_url(&self, url: &str) -> Option<Listing> {
        self.listings.values().find(|l| l.url == url).cloned()
    }

    pub fn all_listings(&self) -> Vec<Listing> {
        let mut listings: Vec<Listing> = self.listings.values().cloned().collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listings
    }

    pub fn append_price_history(
        &mut self,
        listing_id: &str,
        entry: &PriceHistoryEntry,
    ) -> Result<()> {
        if !self.listings.contains_key(listing_id) {
            return Err(AppError::store(format!(
                "price history for unknown listing {listing_id}"
            )));
        }
        let history = self.price_history.entry(listing_id.to_string()).or_default();
        let at = history.partition_point(|e| e.timestamp <= entry.timestamp);
        history.insert(at, entry.clone());
        Ok(())
    }

    pub fn price_history(&self, listing_id: &str) -> Vec<PriceHistoryEntry> {
        self.price_history.get(listing_id).cloned().unwrap_or_default()
    }

    pub fn reminders(&self, filter: &ReminderFilter) -> Vec<Reminder> {
        self.reminders
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn insert_reminder_if_absent(&mut self, reminder: NewReminder) -> Option<Reminder> {
        if self.reminders.iter().any(|r| r.same_rule(&reminder)) {
            return None;
        }
        self.next_reminder_id += 1;
        let stored = reminder.into_reminder(self.next_reminder_id);
        self.reminders.push(stored.clone());
        Some(stored)
    }

    pub fn delete_reminder(&mut self, id: u64) -> bool {
        let before = self.reminders.len();
        self.reminders.retain(|r| r.id != id);
        self.reminders.len() != before
    }

    pub fn owners_of(&self, listing_id: &str) -> Vec<String> {
        self.ownership
            .iter()
            .filter(|o| o.listing_id == listing_id)
            .map(|o| o.user_id.clone())
            .collect()
    }

    pub fn add_ownership(&mut self, user_id: &str, listing_id: &str) -> Result<bool> {
        if !self.listings.contains_key(listing_id) {
            return Err(AppError::not_found(format!("listing {listing_id}")));
        }
        Ok(self.ownership.insert(Ownership {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        }))
    }

    pub fn remove_ownership(&mut self, user_id: &str, listing_id: &str) -> OwnershipRemoval {
        let link = Ownership {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        };
        if !self.ownership.remove(&link) {
            return OwnershipRemoval::NotOwned;
        }
        if self.ownership.iter().any(|o| o.listing_id == listing_id) {
            return OwnershipRemoval::Released;
        }

        self.listings.remove(listing_id);
        self.price_history.remove(listing_id);
        self.reminders.retain(|r| r.target_listing_id != listing_id);
        OwnershipRemoval::Deleted
    }

    pub fn settings(&self, user_id: &str) -> Option<Settings> {
        self.settings.get(user_id).cloned()
    }

    pub fn put_settings(&mut self, settings: &Settings) {
        self.settings
            .insert(settings.user_id.clone(), settings.clone());
    }
}
