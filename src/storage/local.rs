// src/storage/local.rs

//! Local store implementation.
//!
//! Keeps the whole store in memory behind a lock. When opened on a directory,
//! every mutation is flushed to `store.json` with an atomic write (temp file,
//! then rename) so the monitor survives restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    Listing, NewReminder, PriceHistoryEntry, Reminder, ReminderFilter, Settings, UpsertAction,
};
use crate::storage::{HistoryStore, OwnershipRemoval, StoreState};

const STORE_FILE: &str = "store.json";

/// Local store backend.
pub struct LocalStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            path: None,
        }
    }

    /// Open (or create) a store persisted under `root_dir`.
    pub async fn open(root_dir: impl AsRef<Path>) -> Result<Self> {
        let path = root_dir.as_ref().join(STORE_FILE);
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No store found at {}, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a mutation to a copy, flush it, then publish it.
    ///
    /// The in-memory state only changes once the file write succeeded.
    async fn mutate<T>(&self, apply: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let value = apply(&mut next)?;
        if let Some(path) = &self.path {
            Self::write_atomic(path, &serde_json::to_vec_pretty(&next)?).await?;
        }
        *state = next;
        Ok(value)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for LocalStore {
    async fn upsert_listing(&self, listing: &Listing) -> Result<UpsertAction> {
        self.mutate(|state| Ok(state.upsert_listing(listing))).await
    }

    async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        Ok(self.state.read().await.listing(id))
    }

    async fn get_listing_by_url(&self, url: &str) -> Result<Option<Listing>> {
        Ok(self.state.read().await.listing_by_url(url))
    }

    async fn get_all_tracked_listings(&self) -> Result<Vec<Listing>> {
        Ok(self.state.read().await.all_listings())
    }

    async fn append_price_history(
        &self,
        listing_id: &str,
        entry: &PriceHistoryEntry,
    ) -> Result<()> {
        self.mutate(|state| state.append_price_history(listing_id, entry))
            .await
    }

    async fn get_price_history(&self, listing_id: &str) -> Result<Vec<PriceHistoryEntry>> {
        Ok(self.state.read().await.price_history(listing_id))
    }

    async fn get_reminders(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>> {
        Ok(self.state.read().await.reminders(filter))
    }

    async fn insert_reminder_if_absent(&self, reminder: NewReminder) -> Result<Option<Reminder>> {
        self.mutate(|state| Ok(state.insert_reminder_if_absent(reminder)))
            .await
    }

    async fn delete_reminder(&self, id: u64) -> Result<bool> {
        self.mutate(|state| Ok(state.delete_reminder(id))).await
    }

    async fn get_owners_of(&self, listing_id: &str) -> Result<Vec<String>> {
        Ok(self.state.read().await.owners_of(listing_id))
    }

    async fn add_ownership(&self, user_id: &str, listing_id: &str) -> Result<bool> {
        self.mutate(|state| state.add_ownership(user_id, listing_id))
            .await
    }

    async fn remove_ownership(&self, user_id: &str, listing_id: &str) -> Result<OwnershipRemoval> {
        self.mutate(|state| Ok(state.remove_ownership(user_id, listing_id)))
            .await
    }

    async fn get_settings(&self, user_id: &str) -> Result<Option<Settings>> {
        Ok(self.state.read().await.settings(user_id))
    }

    async fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.mutate(|state| {
            state.put_settings(settings);
            Ok(())
        })
        .await
    }
}
