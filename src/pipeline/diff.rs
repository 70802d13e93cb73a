// src/pipeline/diff.rs

//! Diff calculation between consecutive listing snapshots.
//!
//! Compares the last known state of a listing with a freshly extracted
//! snapshot and produces the transition events to dispatch plus the price
//! history entry to persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PriceHistoryEntry, Snapshot, TransitionEvent};

/// Outcome of comparing two snapshots of one listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiffResult {
    /// Independent events; stock and price may both change in one cycle
    pub events: Vec<TransitionEvent>,
    /// Present whenever the current snapshot carries a price
    pub history_entry: Option<PriceHistoryEntry>,
}

impl DiffResult {
    /// Check if there are any transitions.
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Diff `current` against `previous`, stamping history with `now`.
pub fn calculate_diff(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    now: DateTime<Utc>,
) -> DiffResult {
    let history_entry = current.price.map(|price| PriceHistoryEntry {
        listing_id: current.id.clone(),
        price,
        currency: current.currency.clone(),
        timestamp: now,
    });

    let Some(previous) = previous else {
        return DiffResult {
            events: Vec::new(),
            history_entry,
        };
    };

    let mut events = Vec::new();

    if previous.stock > 0 && current.stock == 0 {
        events.push(TransitionEvent::OutOfStock {
            previous_stock: previous.stock,
        });
    } else if previous.stock == 0 && current.stock > 0 {
        events.push(TransitionEvent::BackInStock {
            stock: current.stock,
        });
    }

    if let (Some(before), Some(after)) = (previous.price, current.price) {
        if after < before {
            events.push(TransitionEvent::PriceDrop {
                previous: before,
                current: after,
            });
        } else if after > before {
            events.push(TransitionEvent::PriceIncrease {
                previous: before,
                current: after,
            });
        }
    }

    DiffResult {
        events,
        history_entry,
    }
}
