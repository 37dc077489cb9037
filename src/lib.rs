//! time-sync-status: per-node time synchronization status aggregator
//!
//! Polls chrony and consumes gpsd reports, derives a synchronization verdict
//! and publishes it as a `TimeSynced` Node condition, `time-sync.riasc.eu/*`
//! Node annotations and a small read-only HTTP API.

pub mod config;
pub mod controller;
pub mod error;
pub mod rest_api;
pub mod sources;
pub mod status;

pub use error::{Error, Result};
