//! Thread-safe holder of the latest status snapshot
//!
//! The store is the only shared mutable state of the aggregator. It is shared
//! by `Arc` between the chrony poller, the gpsd consumer and the REST API,
//! which runs on a separate runtime thread. A std `RwLock` is used because
//! critical sections never span an `.await` or any I/O.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::evaluator;
use super::types::{ChronyStatus, GpsdStatus, StatusSnapshot, Synced};

/// A single top-level snapshot field with its new value
#[derive(Clone, Debug)]
pub enum StatusField {
    Chrony(Option<ChronyStatus>),
    Gpsd(Option<GpsdStatus>),
    Synced(Synced),
}

/// Shared status snapshot with internal synchronization
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: RwLock<StatusSnapshot>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the whole snapshot
    pub fn get(&self) -> StatusSnapshot {
        self.read().clone()
    }

    pub fn synced(&self) -> Synced {
        self.read().synced
    }

    /// Replace exactly one top-level field
    pub fn set(&self, field: StatusField) {
        let mut snapshot = self.write();
        match field {
            StatusField::Chrony(chrony) => snapshot.chrony = chrony,
            StatusField::Gpsd(gpsd) => snapshot.gpsd = gpsd,
            StatusField::Synced(synced) => snapshot.synced = synced,
        }
        snapshot.updated = Some(Utc::now());
    }

    /// Store a chrony poll result together with the verdict derived from it
    ///
    /// Both fields change in one critical section, so readers always see
    /// `synced == Unknown` exactly when `chrony` is absent.
    pub fn record_chrony(&self, chrony: Option<ChronyStatus>) -> Synced {
        let synced = evaluator::derive(chrony.as_ref());
        let mut snapshot = self.write();
        snapshot.chrony = chrony;
        snapshot.synced = synced;
        snapshot.updated = Some(Utc::now());
        synced
    }

    /// Insert the latest report of one gpsd class, replacing the previous one
    pub fn merge_gpsd(&self, class: String, record: serde_json::Value) {
        let mut snapshot = self.write();
        snapshot
            .gpsd
            .get_or_insert_with(GpsdStatus::default)
            .insert(class, record);
        snapshot.updated = Some(Utc::now());
    }

    fn read(&self) -> RwLockReadGuard<'_, StatusSnapshot> {
        // A panicking writer cannot leave a field half-assigned
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatusSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
