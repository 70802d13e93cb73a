// src/lib.rs

//! Listing Monitor Library

pub mod error;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

pub use monitor::Monitor;
