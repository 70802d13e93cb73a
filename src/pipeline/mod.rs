// src/pipeline/mod.rs

//! Monitoring pipeline.
//!
//! - `calculate_diff`: Transitions between two snapshots of a listing
//! - `CycleEngine`: One pass over every tracked listing
//! - `Scheduler`: Repeats cycles at the configured poll interval

pub mod cycle;
pub mod diff;
pub mod scheduler;

pub use cycle::{CycleEngine, CycleReport, ListingFailure, ListingOutcome, ListingProcessor};
pub use diff::{DiffResult, calculate_diff};
pub use scheduler::{CycleRunner, Scheduler, SchedulerHandle, SchedulerState};
