// src/services/broadcaster.rs

//! Live state broadcast to connected users.
//!
//! After every cycle each connected user receives the current display state
//! of the listings they own. Connections are held in [`LiveConnections`],
//! a map of user id to an unbounded sender.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

use crate::error::{AppError, Result};
use crate::models::ListingView;
use crate::storage::HistoryStore;

/// Registry of currently connected users.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn list_connected_user_ids(&self) -> Vec<String>;

    async fn send(&self, user_id: &str, message: String) -> Result<()>;
}

/// In-process connection registry.
#[derive(Default)]
pub struct LiveConnections {
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl LiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user; an existing connection of the same user is replaced.
    pub async fn connect(&self, user_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(user_id.to_string(), tx);
        log::debug!("User {} connected", user_id);
        rx
    }

    pub async fn disconnect(&self, user_id: &str) -> bool {
        let removed = self.connections.write().await.remove(user_id).is_some();
        if removed {
            log::debug!("User {} disconnected", user_id);
        }
        removed
    }
}

#[async_trait]
impl ConnectionRegistry for LiveConnections {
    async fn list_connected_user_ids(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    async fn send(&self, user_id: &str, message: String) -> Result<()> {
        let connections = self.connections.read().await;
        let sender = connections
            .get(user_id)
            .ok_or_else(|| AppError::not_found(format!("connection of {user_id}")))?;
        sender
            .send(message)
            .map_err(|_| AppError::dispatch("live", format!("connection of {user_id} closed")))
    }
}

#[derive(Serialize)]
struct ListingsMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    listings: &'a [ListingView],
}

/// Render the live message carrying a user's listings.
pub fn listings_message(listings: &[ListingView]) -> Result<String> {
    Ok(serde_json::to_string(&ListingsMessage {
        kind: "listings",
        listings,
    })?)
}

/// Pushes per-user listing state to connected users.
pub struct Broadcaster {
    store: Arc<dyn HistoryStore>,
    registry: Arc<dyn ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(store: Arc<dyn HistoryStore>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Display state of every tracked listing, grouped by owning user.
    pub async fn listings_by_user(&self) -> Result<HashMap<String, Vec<ListingView>>> {
        let mut by_user: HashMap<String, Vec<ListingView>> = HashMap::new();

        for listing in self.store.get_all_tracked_listings().await? {
            let history = self.store.get_price_history(&listing.id).await?;
            let view = ListingView::new(&listing, &history);
            for owner in self.store.get_owners_of(&listing.id).await? {
                by_user.entry(owner).or_default().push(view.clone());
            }
        }

        Ok(by_user)
    }

    /// Push to every connected user owning at least one listing.
    ///
    /// Returns the number of users that received a message.
    pub async fn broadcast(&self) -> Result<usize> {
        let connected = self.registry.list_connected_user_ids().await;
        if connected.is_empty() {
            return Ok(0);
        }

        let mut by_user = self.listings_by_user().await?;
        let mut pushed = 0;

        for user_id in connected {
            let Some(listings) = by_user.remove(&user_id) else {
                continue;
            };
            let message = listings_message(&listings)?;
            match self.registry.send(&user_id, message).await {
                Ok(()) => {
                    log::debug!("Pushed {} listings to {}", listings.len(), user_id);
                    pushed += 1;
                }
                Err(e) => log::warn!("Failed to push listings to {}: {}", user_id, e),
            }
        }

        Ok(pushed)
    }
}
