// src/pipeline/cycle.rs

//! One monitoring cycle.
//!
//! Every tracked listing is fetched, parsed, diffed and persisted as an
//! independent task. Once all tasks have finished, reminders are dispatched
//! for the transitions found and connected users receive fresh state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Listing, ListingDetails, Snapshot, TransitionEvent, UpsertAction};
use crate::pipeline::calculate_diff;
use crate::services::{
    Broadcaster, DispatchReport, ListingExtractor, ListingState, ReminderDispatcher, SourceClient,
};
use crate::storage::HistoryStore;

/// Result of processing one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingOutcome {
    pub listing: Listing,
    /// State before this pass; `None` on first sight
    pub previous: Option<Snapshot>,
    pub current: Snapshot,
    pub events: Vec<TransitionEvent>,
    pub action: UpsertAction,
}

/// Fetches, parses, diffs and persists single listings.
pub struct ListingProcessor {
    source: Arc<dyn SourceClient>,
    extractor: ListingExtractor,
    store: Arc<dyn HistoryStore>,
}

impl ListingProcessor {
    pub fn new(
        source: Arc<dyn SourceClient>,
        extractor: ListingExtractor,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
        }
    }

    /// Fetch and extract the full details of a listing without storing anything.
    pub async fn details(&self, url: &str, with_images: bool) -> Result<ListingDetails> {
        let document = self.source.fetch(url).await?;
        Ok(self
            .extractor
            .extract_details(&document, with_images, Utc::now())?)
    }

    /// Process one listing URL end to end.
    pub async fn process(&self, url: &str) -> Result<ListingOutcome> {
        let document = self.source.fetch(url).await?;
        let current = self.extractor.extract(&document)?;

        let stored = self.store.get_listing(&current.id).await?;
        let previous = match &stored {
            Some(listing) => {
                let history = self.store.get_price_history(&listing.id).await?;
                Some(Snapshot::from_stored(listing, history.last()))
            }
            None => None,
        };

        let now = Utc::now();
        let diff = calculate_diff(previous.as_ref(), &current, now);

        let created_at = stored.as_ref().map_or(now, |l| l.created_at);
        let listing = current.to_listing(created_at);
        let action = self.store.upsert_listing(&listing).await?;
        if let Some(entry) = &diff.history_entry {
            self.store.append_price_history(&listing.id, entry).await?;
        }

        Ok(ListingOutcome {
            listing,
            previous,
            current,
            events: diff.events,
            action,
        })
    }
}

/// A listing that failed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingFailure {
    pub url: String,
    pub error: String,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ListingFailure>,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub users_pushed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs monitoring cycles over every tracked listing.
pub struct CycleEngine {
    store: Arc<dyn HistoryStore>,
    processor: ListingProcessor,
    dispatcher: ReminderDispatcher,
    broadcaster: Broadcaster,
    max_concurrent: usize,
}

impl CycleEngine {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        processor: ListingProcessor,
        dispatcher: ReminderDispatcher,
        broadcaster: Broadcaster,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            processor,
            dispatcher,
            broadcaster,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn processor(&self) -> &ListingProcessor {
        &self.processor
    }

    pub fn dispatcher(&self) -> &ReminderDispatcher {
        &self.dispatcher
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run one cycle. Only a failure to enumerate listings fails the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let listings = self.store.get_all_tracked_listings().await?;
        log::info!("Starting cycle over {} listings", listings.len());

        let results: Vec<(String, Result<ListingOutcome>)> = stream::iter(listings)
            .map(|listing| async move {
                let result = AssertUnwindSafe(self.processor.process(&listing.url))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(AppError::Task(format!("processing of {} panicked", listing.url)))
                    });
                (listing.url, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let attempted = results.len();
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (url, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let verb = if e.is_listing_failure() { "skipped" } else { "failed" };
                    log::warn!("Listing {} {}: {}", url, verb, e);
                    failures.push(ListingFailure {
                        url,
                        error: e.to_string(),
                    });
                }
            }
        }

        let dispatched = self.dispatch_all(&outcomes).await;

        let users_pushed = match self.broadcaster.broadcast().await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Broadcast failed: {}", e);
                0
            }
        };

        let report = CycleReport {
            attempted,
            succeeded: outcomes.len(),
            failures,
            notifications_sent: dispatched.sent,
            notifications_failed: dispatched.failed,
            users_pushed,
            started_at,
            finished_at: Utc::now(),
        };

        log::info!(
            "Cycle complete: {}/{} listings, {} notifications sent, {} failed, {} users pushed",
            report.succeeded,
            report.attempted,
            report.notifications_sent,
            report.notifications_failed,
            report.users_pushed
        );

        Ok(report)
    }

    /// Dispatch reminders for outcomes that carry transitions.
    pub async fn dispatch_all(&self, outcomes: &[ListingOutcome]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let pending: Vec<&ListingOutcome> = outcomes
            .iter()
            .filter(|o| o.previous.is_some() && !o.events.is_empty())
            .collect();
        if pending.is_empty() {
            return report;
        }

        if let Err(e) = self.dispatcher.begin_pass().await {
            log::error!("Failed to load reminders, skipping dispatch: {}", e);
            return report;
        }

        for outcome in pending {
            let prices = match self.store.get_price_history(&outcome.listing.id).await {
                Ok(prices) => prices,
                Err(e) => {
                    log::warn!("Failed to load history of {}: {}", outcome.listing.id, e);
                    Vec::new()
                }
            };
            let state = ListingState::new(outcome.listing.clone(), prices);
            report.merge(
                self.dispatcher
                    .dispatch(&outcome.listing.id, &outcome.events, &state)
                    .await,
            );
        }

        report
    }
}
