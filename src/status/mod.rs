//! Node time-sync status model
//!
//! This module defines the merged status snapshot, the store that shares it
//! between producers and readers, and the synchronization verdict.

pub mod evaluator;
mod store;
mod types;

pub use evaluator::derive;
pub use store::{StatusField, StatusStore};
pub use types::*;
