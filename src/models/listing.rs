// src/models/listing.rs

//! Listing, snapshot and price history data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked marketplace listing as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    /// Last path segment of the canonical URL
    pub id: String,

    /// Listing title
    pub title: String,

    /// Canonical listing URL
    pub url: String,

    /// Units available
    pub stock: u32,

    /// First successful scrape
    pub created_at: DateTime<Utc>,
}

/// One recorded price of a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistoryEntry {
    pub listing_id: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured facts parsed from one fetched listing document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub title: String,
    pub url: String,
    pub stock: u32,
    pub price: Option<f64>,
    pub currency: Option<String>,
}

impl Snapshot {
    /// Rebuild the last known state of a listing from the store.
    pub fn from_stored(listing: &Listing, latest: Option<&PriceHistoryEntry>) -> Self {
        Self {
            id: listing.id.clone(),
            title: listing.title.clone(),
            url: listing.url.clone(),
            stock: listing.stock,
            price: latest.map(|entry| entry.price),
            currency: latest.and_then(|entry| entry.currency.clone()),
        }
    }

    /// Convert into a storable listing, keeping the original creation time.
    pub fn to_listing(&self, created_at: DateTime<Utc>) -> Listing {
        Listing {
            id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            stock: self.stock,
            created_at,
        }
    }
}

/// Full detail view of a listing page, scraped on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingDetails {
    #[serde(flatten)]
    pub snapshot: Snapshot,

    /// Item specifics, label to value
    pub features: BTreeMap<String, String>,

    pub seller_url: Option<String>,

    /// Full-size image URLs; empty unless requested
    #[serde(default)]
    pub images: Vec<String>,

    pub scraped_at: DateTime<Utc>,
}

/// Display state of a listing pushed to clients and returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingView {
    pub id: String,
    pub title: String,
    pub url: String,
    pub stock: u32,
    pub price: Option<f64>,
    pub currency: Option<String>,
    /// `current - previous` over the last two history entries
    pub price_delta: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_history: Vec<PriceHistoryEntry>,
}

impl ListingView {
    /// Build the display state from a listing and its chronological history.
    pub fn new(listing: &Listing, history: &[PriceHistoryEntry]) -> Self {
        let latest = history.last();
        Self {
            id: listing.id.clone(),
            title: listing.title.clone(),
            url: listing.url.clone(),
            stock: listing.stock,
            price: latest.map(|entry| entry.price),
            currency: latest.and_then(|entry| entry.currency.clone()),
            price_delta: price_delta(history),
            price_history: Vec::new(),
        }
    }

    /// Attach the full price history.
    pub fn with_history(mut self, history: Vec<PriceHistoryEntry>) -> Self {
        self.price_history = history;
        self
    }
}

/// Signed change between the latest entry and the one preceding it.
pub fn price_delta(history: &[PriceHistoryEntry]) -> f64 {
    match history {
        [.., previous, current] => current.price - previous.price,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price: f64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            listing_id: "123".to_string(),
            price,
            currency: Some("US".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_price_delta() {
        assert_eq!(price_delta(&[]), 0.0);
        assert_eq!(price_delta(&[entry(10.0)]), 0.0);
        assert_eq!(price_delta(&[entry(10.0), entry(10.0)]), 0.0);
        assert_eq!(price_delta(&[entry(5.0), entry(10.0), entry(7.5)]), -2.5);
    }

    #[test]
    fn test_view_uses_latest_price() {
        let listing = Listing {
            id: "123".to_string(),
            title: "Widget".to_string(),
            url: "https://example.com/itm/123".to_string(),
            stock: 4,
            created_at: Utc::now(),
        };
        let view = ListingView::new(&listing, &[entry(10.0), entry(12.0)]);
        assert_eq!(view.price, Some(12.0));
        assert_eq!(view.price_delta, 2.0);
        assert_eq!(view.currency.as_deref(), Some("US"));
        assert!(view.price_history.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_created_at() {
        let created = Utc::now();
        let listing = Listing {
            id: "9".to_string(),
            title: "T".to_string(),
            url: "https://example.com/itm/9".to_string(),
            stock: 0,
            created_at: created,
        };
        let snapshot = Snapshot::from_stored(&listing, None);
        assert_eq!(snapshot.price, None);
        assert_eq!(snapshot.to_listing(created), listing);
    }
}
