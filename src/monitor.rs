// src/monitor.rs

//! Monitor facade.
//!
//! Wires the store, source client, extractor, dispatcher and broadcaster once
//! and exposes the operations an outer API layer needs: listing management,
//! settings, reminders, scheduler state and price statistics.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{
    Config, ListingDetails, ListingView, MAX_POLL_INTERVAL_SECS, NewReminder, Reminder, ReminderFilter,
    Settings, UpsertAction,
};
use crate::pipeline::{
    CycleEngine, CycleReport, ListingProcessor, Scheduler, SchedulerHandle, SchedulerState,
};
use crate::services::{
    Broadcaster, ChannelSet, HttpSourceClient, ListingExtractor, LiveConnections,
    ReminderDispatcher, SourceClient,
};
use crate::storage::{HistoryStore, LocalStore, OwnershipRemoval};

/// Result of adding or refreshing a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingAdded {
    pub id: String,
    pub action: UpsertAction,
    pub listing: ListingView,
}

/// Time until the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum NextUpdate {
    Idle {
        deadline: DateTime<Utc>,
        seconds: i64,
    },
    Running,
    /// No scheduler has been started
    Stopped,
}

/// Price summary of one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPrice {
    pub date: NaiveDate,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub samples: usize,
}

/// Listing monitor.
pub struct Monitor {
    config: Config,
    store: Arc<dyn HistoryStore>,
    engine: Arc<CycleEngine>,
    live: Arc<LiveConnections>,
    scheduler: Option<SchedulerHandle>,
}

impl Monitor {
    /// Assemble a monitor from injected collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn HistoryStore>,
        source: Arc<dyn SourceClient>,
        channels: ChannelSet,
    ) -> Result<Self> {
        let extractor = ListingExtractor::new(&config.extractor)?;
        let live = Arc::new(LiveConnections::new());

        let processor = ListingProcessor::new(source, extractor, Arc::clone(&store));
        let dispatcher = ReminderDispatcher::new(Arc::clone(&store), channels);
        let broadcaster = Broadcaster::new(Arc::clone(&store), live.clone());
        let engine = CycleEngine::new(
            Arc::clone(&store),
            processor,
            dispatcher,
            broadcaster,
            config.source.max_concurrent,
        );

        Ok(Self {
            config,
            store,
            engine: Arc::new(engine),
            live,
            scheduler: None,
        })
    }

    /// Open a monitor persisted under `storage_dir` with HTTP collaborators.
    pub async fn open(config: Config, storage_dir: impl AsRef<Path>) -> Result<Self> {
        let store = Arc::new(LocalStore::open(storage_dir).await?);
        let source = HttpSourceClient::from_config(&config.source)?;
        let channels = ChannelSet::from_config(
            &config.telegram,
            crate::utils::http::create_async_client(&config.source)?,
        );
        Self::new(config, store, Arc::new(source), channels)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn live(&self) -> &Arc<LiveConnections> {
        &self.live
    }

    pub fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }

    /// Spawn the scheduler; at most one runs per monitor.
    pub fn start(&mut self) -> Result<tokio::task::JoinHandle<()>> {
        if self.scheduler.is_some() {
            return Err(AppError::validation("scheduler already started"));
        }
        let (scheduler, handle) = Scheduler::new(
            self.engine.clone(),
            Arc::clone(&self.store),
            self.config.scheduler.clone(),
        );
        self.scheduler = Some(handle);
        Ok(tokio::spawn(scheduler.run()))
    }

    /// Run one cycle outside the scheduler.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.engine.run_cycle().await
    }

    /// Scrape a listing now and link it to `user_id`.
    pub async fn add_or_refresh_listing(&self, user_id: &str, url: &str) -> Result<ListingAdded> {
        let url = url.trim();
        url::Url::parse(url)?;

        let outcome = self.engine.processor().process(url).await?;
        if self.store.add_ownership(user_id, &outcome.listing.id).await? {
            log::info!("User {} now tracks {}", user_id, outcome.listing.id);
        }

        let sent = self.engine.dispatch_all(std::slice::from_ref(&outcome)).await;
        if sent.sent + sent.failed > 0 {
            log::info!(
                "Refresh of {} sent {} notifications ({} failed)",
                outcome.listing.id,
                sent.sent,
                sent.failed
            );
        }

        let history = self.store.get_price_history(&outcome.listing.id).await?;
        Ok(ListingAdded {
            id: outcome.listing.id.clone(),
            action: outcome.action,
            listing: ListingView::new(&outcome.listing, &history),
        })
    }

    /// Scrape the full details of a listing page. Nothing is stored.
    pub async fn listing_details(&self, url: &str, with_images: bool) -> Result<ListingDetails> {
        let url = url.trim();
        url::Url::parse(url)?;
        self.engine.processor().details(url, with_images).await
    }

    /// Unlink a user from a listing.
    pub async fn delete_listing(&self, user_id: &str, listing_id: &str) -> Result<OwnershipRemoval> {
        match self.store.remove_ownership(user_id, listing_id).await? {
            OwnershipRemoval::NotOwned => Err(AppError::not_found(format!(
                "listing {listing_id} of user {user_id}"
            ))),
            removal => {
                log::info!("User {} released {} ({:?})", user_id, listing_id, removal);
                Ok(removal)
            }
        }
    }

    /// Display state of a user's listings, newest first, with full history.
    pub async fn current_listings(&self, user_id: &str) -> Result<Vec<ListingView>> {
        let mut views = Vec::new();
        for listing in self.store.get_all_tracked_listings().await? {
            let owners = self.store.get_owners_of(&listing.id).await?;
            if !owners.iter().any(|o| o == user_id) {
                continue;
            }
            let history = self.store.get_price_history(&listing.id).await?;
            views.push(ListingView::new(&listing, &history).with_history(history));
        }
        Ok(views)
    }

    /// Stored settings, or defaults for a user that never saved any.
    pub async fn settings(&self, user_id: &str) -> Result<Settings> {
        Ok(self.store.get_settings(user_id).await?.unwrap_or_else(|| {
            Settings::with_defaults(user_id, self.config.scheduler.default_interval_secs)
        }))
    }

    /// Save settings and wake the scheduler so a new interval applies.
    pub async fn update_settings(&self, settings: Settings) -> Result<()> {
        if settings.user_id.trim().is_empty() {
            return Err(AppError::validation("settings need a user id"));
        }
        if settings.poll_interval_secs == 0 {
            return Err(AppError::validation("poll interval must be positive"));
        }
        if settings.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(AppError::validation(format!(
                "poll interval must be at most {MAX_POLL_INTERVAL_SECS}s"
            )));
        }

        self.store.put_settings(&settings).await?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.wake();
        }
        Ok(())
    }

    /// Add a reminder; `None` when an equivalent one exists.
    pub async fn add_reminder(&self, reminder: NewReminder) -> Result<Option<Reminder>> {
        if self
            .store
            .get_listing(&reminder.target_listing_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found(format!(
                "listing {}",
                reminder.target_listing_id
            )));
        }
        self.engine.dispatcher().reminders().add(reminder).await
    }

    pub async fn delete_reminder(&self, id: u64) -> Result<bool> {
        self.store.delete_reminder(id).await
    }

    pub async fn reminders(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>> {
        self.store.get_reminders(filter).await
    }

    pub fn next_update(&self) -> NextUpdate {
        match self.scheduler.as_ref().map(SchedulerHandle::state) {
            Some(SchedulerState::Idle { deadline }) => NextUpdate::Idle {
                deadline,
                seconds: (deadline - Utc::now()).num_seconds().max(0),
            },
            Some(SchedulerState::Running) => NextUpdate::Running,
            None => NextUpdate::Stopped,
        }
    }

    /// Daily price summary between two dates, inclusive.
    pub async fn price_statistics(
        &self,
        listing_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyPrice>> {
        if from > to {
            return Err(AppError::validation(format!(
                "start date {from} is after end date {to}"
            )));
        }
        if self.store.get_listing(listing_id).await?.is_none() {
            return Err(AppError::not_found(format!("listing {listing_id}")));
        }

        let mut days: BTreeMap<NaiveDate, DailyPrice> = BTreeMap::new();
        for entry in self.store.get_price_history(listing_id).await? {
            let date = entry.timestamp.date_naive();
            if date < from || date > to {
                continue;
            }
            days.entry(date)
                .and_modify(|day| {
                    day.min = day.min.min(entry.price);
                    day.max = day.max.max(entry.price);
                    day.last = entry.price;
                    day.samples += 1;
                })
                .or_insert(DailyPrice {
                    date,
                    min: entry.price,
                    max: entry.price,
                    last: entry.price,
                    samples: 1,
                });
        }
        Ok(days.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::models::{PriceHistoryEntry, ReminderMethod, TransitionKind};
    use crate::services::LogChannel;
    use crate::testing::{RecordingChannel, ScriptedSource, listing_page};

    const URL: &str = "https://www.ebay.com/itm/777";

    struct Fixture {
        store: Arc<LocalStore>,
        source: Arc<ScriptedSource>,
        telegram: Arc<RecordingChannel>,
        monitor: Monitor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LocalStore::in_memory());
        let source = Arc::new(ScriptedSource::default());
        let telegram = Arc::new(RecordingChannel::default());
        let channels = ChannelSet::new(
            telegram.clone(),
            Arc::new(LogChannel::new(ReminderMethod::Sms)),
            Arc::new(LogChannel::new(ReminderMethod::Email)),
        );
        let monitor =
            Monitor::new(Config::default(), store.clone(), source.clone(), channels).unwrap();
        Fixture {
            store,
            source,
            telegram,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_add_then_refresh() {
        let f = fixture();
        f.source
            .page(URL, listing_page("Turntable", Some("US $99.00"), Some(3)));

        let added = f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();
        assert_eq!(added.id, "777");
        assert_eq!(added.action, UpsertAction::Inserted);
        assert_eq!(added.listing.price, Some(99.0));

        let again = f.monitor.add_or_refresh_listing("bob", URL).await.unwrap();
        assert_eq!(again.action, UpsertAction::Updated);
        assert_eq!(f.store.get_owners_of("777").await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_refresh_dispatches_transitions() {
        let f = fixture();
        f.source
            .page(URL, listing_page("Turntable", Some("US $99.00"), Some(3)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();
        f.monitor
            .add_reminder(NewReminder::new(
                ReminderMethod::Telegram,
                "777",
                TransitionKind::OutOfStock,
            ))
            .await
            .unwrap();

        f.source
            .page(URL, listing_page("Turntable", Some("US $99.00"), None));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();
        assert_eq!(f.telegram.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_url() {
        let f = fixture();
        assert!(matches!(
            f.monitor.add_or_refresh_listing("alice", "not a url").await,
            Err(AppError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_listing_ownership() {
        let f = fixture();
        f.source.page(URL, listing_page("Turntable", None, Some(1)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();

        assert!(matches!(
            f.monitor.delete_listing("bob", "777").await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            f.monitor.delete_listing("alice", "777").await.unwrap(),
            OwnershipRemoval::Deleted
        );
        assert!(f.monitor.current_listings("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_current_listings_carry_history() {
        let f = fixture();
        f.source
            .page(URL, listing_page("Turntable", Some("US $99.00"), Some(1)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();
        f.source
            .page(URL, listing_page("Turntable", Some("US $89.00"), Some(1)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();

        let views = f.monitor.current_listings("alice").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].price_history.len(), 2);
        assert_eq!(views[0].price_delta, -10.0);
        assert!(f.monitor.current_listings("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_details_does_not_track() {
        let f = fixture();
        let body = listing_page("Turntable", Some("US $99.00"), Some(3)).replace(
            "</body>",
            r#"<dl class="ux-labels-values"><dt class="ux-labels-values__labels">Brand</dt><dd class="ux-labels-values__values">Technics</dd></dl></body>"#,
        );
        f.source.page(URL, body);

        let details = f.monitor.listing_details(URL, false).await.unwrap();
        assert_eq!(details.snapshot.id, "777");
        assert_eq!(details.snapshot.price, Some(99.0));
        assert_eq!(details.features["Brand"], "Technics");
        assert!(f.store.get_listing("777").await.unwrap().is_none());

        assert!(matches!(
            f.monitor.listing_details("not a url", false).await,
            Err(AppError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_settings_defaults_and_validation() {
        let f = fixture();
        let settings = f.monitor.settings("alice").await.unwrap();
        assert_eq!(settings.poll_interval_secs, 40);

        let mut bad = settings.clone();
        bad.poll_interval_secs = 0;
        assert!(f.monitor.update_settings(bad).await.is_err());

        let mut good = settings;
        good.poll_interval_secs = 120;
        f.monitor.update_settings(good).await.unwrap();
        assert_eq!(f.monitor.settings("alice").await.unwrap().poll_interval_secs, 120);
    }

    #[tokio::test]
    async fn test_update_settings_rejects_huge_interval() {
        let f = fixture();
        let mut settings = f.monitor.settings("alice").await.unwrap();
        settings.poll_interval_secs = u64::MAX;
        assert!(matches!(
            f.monitor.update_settings(settings).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(f.monitor.settings("alice").await.unwrap().poll_interval_secs, 40);
    }

    #[tokio::test]
    async fn test_reminders_require_listing_and_deduplicate() {
        let f = fixture();
        let rule = NewReminder::new(ReminderMethod::Email, "777", TransitionKind::PriceDrop);
        assert!(matches!(
            f.monitor.add_reminder(rule.clone()).await,
            Err(AppError::NotFound(_))
        ));

        f.source.page(URL, listing_page("Turntable", None, Some(1)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();

        let stored = f.monitor.add_reminder(rule.clone()).await.unwrap().unwrap();
        assert!(f.monitor.add_reminder(rule).await.unwrap().is_none());
        assert_eq!(
            f.monitor.reminders(&ReminderFilter::default()).await.unwrap().len(),
            1
        );

        assert!(f.monitor.delete_reminder(stored.id).await.unwrap());
        assert!(!f.monitor.delete_reminder(stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_update_without_scheduler() {
        let f = fixture();
        assert_eq!(f.monitor.next_update(), NextUpdate::Stopped);
    }

    #[tokio::test]
    async fn test_price_statistics_by_day() {
        let f = fixture();
        f.source.page(URL, listing_page("Turntable", None, Some(1)));
        f.monitor.add_or_refresh_listing("alice", URL).await.unwrap();

        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2024, 3, 3, 8, 0, 0).unwrap();
        for (at, price) in [
            (day1, 10.0),
            (day1 + Duration::hours(2), 7.0),
            (day1 + Duration::hours(4), 8.0),
            (day3, 12.0),
        ] {
            f.store
                .append_price_history(
                    "777",
                    &PriceHistoryEntry {
                        listing_id: "777".to_string(),
                        price,
                        currency: None,
                        timestamp: at,
                    },
                )
                .await
                .unwrap();
        }

        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let stats = f.monitor.price_statistics("777", from, to).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(
            stats[0],
            DailyPrice {
                date: from,
                min: 7.0,
                max: 10.0,
                last: 8.0,
                samples: 3
            }
        );
        assert_eq!(stats[1].date, to);
        assert_eq!(stats[1].samples, 1);

        assert!(f.monitor.price_statistics("777", to, from).await.is_err());
    }

    #[tokio::test]
    async fn test_scheduler_reports_next_update() {
        let mut f = fixture();
        let task = f.monitor.start().unwrap();
        assert!(f.monitor.start().is_err());

        let handle = f.monitor.scheduler().unwrap().clone();
        let mut state = handle.subscribe();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            state.wait_for(|s| {
                matches!(s, SchedulerState::Idle { deadline } if *deadline > Utc::now() + Duration::seconds(30))
            }),
        )
        .await
        .unwrap()
        .unwrap();
        drop(state);

        assert!(matches!(f.monitor.next_update(), NextUpdate::Idle { seconds, .. } if seconds <= 40));

        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
