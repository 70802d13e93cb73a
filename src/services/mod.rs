// src/services/mod.rs

//! Service layer for the listing monitor.
//!
//! This module contains the business logic for:
//! - Listing document fetching (`SourceClient`)
//! - Snapshot extraction (`ListingExtractor`)
//! - Reminder matching and delivery (`ReminderDispatcher`)
//! - Live state pushes (`Broadcaster`)

mod broadcaster;
mod channels;
mod dispatcher;
mod extractor;
mod source;

pub use broadcaster::{Broadcaster, ConnectionRegistry, LiveConnections, listings_message};
pub use channels::{ChannelSet, LogChannel, Notification, NotificationChannel, TelegramChannel};
pub use dispatcher::{
    DispatchReport, ListingState, ReminderCache, ReminderDispatcher, render_message,
};
pub use extractor::{
    Document, ListingExtractor, ParsedPrice, normalize_amount, parse_price_text, parse_quantity,
};
pub use source::{HttpSourceClient, SourceClient};
