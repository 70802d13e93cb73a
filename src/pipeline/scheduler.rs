// src/pipeline/scheduler.rs

//! Cycle scheduler.
//!
//! Alternates between `Running` and `Idle { deadline }`. The deadline is the
//! end of the last cycle plus the poll interval read from the store, so a
//! settings change takes effect at the next deadline computation. An idle
//! scheduler can be woken to recompute its deadline immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, watch};

use crate::error::Result;
use crate::models::{MAX_POLL_INTERVAL_SECS, SchedulerConfig};
use crate::pipeline::{CycleEngine, CycleReport};
use crate::storage::HistoryStore;

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SchedulerState {
    Idle { deadline: DateTime<Utc> },
    Running,
}

/// Something that runs one monitoring cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport>;
}

#[async_trait]
impl CycleRunner for CycleEngine {
    async fn run_cycle(&self) -> Result<CycleReport> {
        CycleEngine::run_cycle(self).await
    }
}

/// Control surface of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    state: watch::Receiver<SchedulerState>,
    wake: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Deadline of the next cycle; `None` while a cycle runs.
    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            SchedulerState::Idle { deadline } => Some(deadline),
            SchedulerState::Running => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Interrupt the idle wait so the deadline is recomputed.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Stop after the current cycle, or immediately when idle.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Drives monitoring cycles forever.
pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    store: Arc<dyn HistoryStore>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        store: Arc<dyn HistoryStore>,
        config: SchedulerConfig,
    ) -> (Self, SchedulerHandle) {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle {
            deadline: Utc::now(),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());

        let handle = SchedulerHandle {
            state: state_rx,
            wake: Arc::clone(&wake),
            shutdown: Arc::new(shutdown_tx),
        };
        let scheduler = Self {
            runner,
            store,
            config,
            state: state_tx,
            wake,
            shutdown: shutdown_rx,
        };
        (scheduler, handle)
    }

    /// Run until shut down.
    pub async fn run(mut self) {
        log::info!("Scheduler started");

        let mut last_end = Utc::now();
        if !self.config.run_immediately && !self.wait_until_due(last_end).await {
            log::info!("Scheduler stopped");
            return;
        }

        loop {
            self.state.send_replace(SchedulerState::Running);

            if let Err(e) = self.runner.run_cycle().await {
                log::error!(
                    "Cycle failed: {}, cooling down for {}s",
                    e,
                    self.config.failure_cooldown_secs
                );
                let cooldown = Duration::from_secs(self.config.failure_cooldown_secs);
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = self.shutdown.changed() => break,
                }
            }

            last_end = Utc::now();
            if *self.shutdown.borrow() || !self.wait_until_due(last_end).await {
                break;
            }
        }

        log::info!("Scheduler stopped");
    }

    /// Idle until the deadline. Returns false on shutdown.
    async fn wait_until_due(&mut self, last_end: DateTime<Utc>) -> bool {
        loop {
            let interval = self.interval_secs().await;
            let deadline = deadline_after(last_end, interval);
            self.state.send_replace(SchedulerState::Idle { deadline });
            log::debug!("Next cycle at {}", deadline);

            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => return true,
                _ = self.wake.notified() => {
                    log::debug!("Scheduler woken, recomputing deadline");
                }
                _ = self.shutdown.changed() => return false,
            }
        }
    }

    /// Current poll interval of the configured settings user.
    async fn interval_secs(&self) -> u64 {
        let user = &self.config.settings_user;
        let secs = match self.store.get_settings(user).await {
            Ok(Some(settings)) => settings.poll_interval_secs,
            Ok(None) => self.config.default_interval_secs,
            Err(e) => {
                log::warn!("Failed to read settings of {}: {}", user, e);
                self.config.default_interval_secs
            }
        };
        if secs > MAX_POLL_INTERVAL_SECS {
            log::warn!(
                "Poll interval {}s of {} is out of range, using {}s",
                secs,
                user,
                self.config.default_interval_secs
            );
            return self.config.default_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS);
        }
        secs.max(1)
    }
}

/// Deadline `secs` after `last_end`, capped to the longest accepted interval.
fn deadline_after(last_end: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(secs.min(MAX_POLL_INTERVAL_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs)
        .and_then(|delta| last_end.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
