//! Synchronization verdict derived from chrony status
//!
//! The verdict has no hysteresis: a single tick without a selected source
//! flips it to [`Synced::False`].

use super::types::{ChronyStatus, SourceState, Synced};

/// Derive the tri-state verdict from the latest chrony status
///
/// - `Unknown` when chrony status is absent
/// - `True` when at least one source is in the `synced` state
/// - `False` otherwise
pub fn derive(chrony: Option<&ChronyStatus>) -> Synced {
    match chrony {
        None => Synced::Unknown,
        Some(status) => {
            if status
                .sources
                .values()
                .any(|source| source.state == SourceState::Synced)
            {
                Synced::True
            } else {
                Synced::False
            }
        }
    }
}
