// src/services/dispatcher.rs

//! Reminder matching and dispatch.
//!
//! Transition events are matched against stored reminders and one
//! notification is sent per matching reminder. A failing reminder never
//! blocks the others.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{
    Listing, NewReminder, PriceHistoryEntry, Reminder, ReminderFilter, TransitionEvent,
    TransitionKind,
};
use crate::services::{ChannelSet, Notification};
use crate::storage::HistoryStore;

/// Read-through cache of stored reminders.
///
/// Refreshed from the store at the start of every add-reminder call and
/// every dispatch pass.
pub struct ReminderCache {
    store: Arc<dyn HistoryStore>,
    reminders: RwLock<Vec<Reminder>>,
}

impl ReminderCache {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            reminders: RwLock::new(Vec::new()),
        }
    }

    /// Reload every reminder from the store.
    pub async fn refresh(&self) -> Result<()> {
        let fresh = self.store.get_reminders(&ReminderFilter::default()).await?;
        *self.reminders.write().await = fresh;
        Ok(())
    }

    /// Cached reminders for a listing and transition.
    pub async fn matching(&self, listing_id: &str, kind: TransitionKind) -> Vec<Reminder> {
        let filter = ReminderFilter {
            listing_id: Some(listing_id.to_string()),
            transition: Some(kind),
            method: None,
        };
        self.reminders
            .read()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Store a reminder unless an equivalent one exists.
    pub async fn add(&self, reminder: NewReminder) -> Result<Option<Reminder>> {
        self.refresh().await?;
        if self.reminders.read().await.iter().any(|r| r.same_rule(&reminder)) {
            log::debug!(
                "Reminder {} / {} / {} already exists",
                reminder.method,
                reminder.target_listing_id,
                reminder.transition
            );
            return Ok(None);
        }

        let stored = self.store.insert_reminder_if_absent(reminder).await?;
        if let Some(stored) = &stored {
            self.reminders.write().await.push(stored.clone());
        }
        Ok(stored)
    }
}

/// Listing state handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingState {
    pub listing: Listing,
    /// Chronological; the last entry is the current price
    pub prices: Vec<PriceHistoryEntry>,
}

impl ListingState {
    pub fn new(listing: Listing, prices: Vec<PriceHistoryEntry>) -> Self {
        Self { listing, prices }
    }

    pub fn current_price(&self) -> Option<&PriceHistoryEntry> {
        self.prices.last()
    }

    pub fn previous_price(&self) -> Option<&PriceHistoryEntry> {
        self.prices.iter().rev().nth(1)
    }
}

/// Counts of one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Matches transition events to reminders and sends notifications.
pub struct ReminderDispatcher {
    store: Arc<dyn HistoryStore>,
    cache: ReminderCache,
    channels: ChannelSet,
}

impl ReminderDispatcher {
    pub fn new(store: Arc<dyn HistoryStore>, channels: ChannelSet) -> Self {
        Self {
            cache: ReminderCache::new(Arc::clone(&store)),
            store,
            channels,
        }
    }

    pub fn reminders(&self) -> &ReminderCache {
        &self.cache
    }

    /// Begin a dispatch pass by refreshing the reminder cache.
    pub async fn begin_pass(&self) -> Result<()> {
        self.cache.refresh().await
    }

    /// Send one notification per reminder matching each event.
    pub async fn dispatch(
        &self,
        listing_id: &str,
        events: &[TransitionEvent],
        state: &ListingState,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for event in events {
            let text = render_message(event, state);
            for reminder in self.cache.matching(listing_id, event.kind()).await {
                let notification = Notification {
                    method: reminder.method,
                    recipient: self.recipient_for(&reminder).await,
                    listing_id: listing_id.to_string(),
                    transition: reminder.transition,
                    text: text.clone(),
                };

                match self.channels.select(reminder.method).send(&notification).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        report.failed += 1;
                        log::warn!(
                            "Reminder {} ({} via {}) failed: {}",
                            reminder.id,
                            reminder.transition,
                            reminder.method,
                            e
                        );
                    }
                }
            }
        }

        report
    }

    /// Contact of the reminder's user for its method, if any.
    async fn recipient_for(&self, reminder: &Reminder) -> Option<String> {
        let user_id = reminder.user_id.as_deref()?;
        match self.store.get_settings(user_id).await {
            Ok(settings) => settings?.contact_for(reminder.method).map(str::to_string),
            Err(e) => {
                log::warn!("Failed to load settings of {}: {}", user_id, e);
                None
            }
        }
    }
}

/// Render the plain-text message for a transition.
pub fn render_message(event: &TransitionEvent, state: &ListingState) -> String {
    let listing = &state.listing;
    let currency = state
        .current_price()
        .and_then(|p| p.currency.as_deref());

    let mut message = match event {
        TransitionEvent::OutOfStock { .. } => {
            format!("❌ {} is now out of stock", listing.title)
        }
        TransitionEvent::BackInStock { stock } => {
            let mut text = format!(
                "✅ {} is back in stock!\n\nQuantity available: {}",
                listing.title, stock
            );
            if let Some(price) = state.current_price() {
                text.push_str(&format!("\nPrice: {}", money(currency, price.price)));
            }
            text
        }
        TransitionEvent::PriceDrop { current, .. } | TransitionEvent::PriceIncrease { current, .. } => {
            let headline = if event.kind() == TransitionKind::PriceDrop {
                "📉 Price dropped for"
            } else {
                "📈 Price increased for"
            };
            let new_price = state.current_price().map_or(*current, |p| p.price);
            let mut text = format!(
                "{} {}!\n\nNew price: {}",
                headline,
                listing.title,
                money(currency, new_price)
            );
            if let Some(previous) = state.previous_price() {
                text.push_str(&format!(
                    "\nPrice difference: {}",
                    signed_money(currency, new_price - previous.price)
                ));
            }
            text
        }
    };

    message.push_str(&format!("\n\nView listing: {}", listing.url));
    message
}

fn money(currency: Option<&str>, amount: f64) -> String {
    match currency {
        Some(code) => format!("{code} {amount:.2}"),
        None => format!("{amount:.2}"),
    }
}

fn signed_money(currency: Option<&str>, amount: f64) -> String {
    match currency {
        Some(code) => format!("{code} {amount:+.2}"),
        None => format!("{amount:+.2}"),
    }
}
