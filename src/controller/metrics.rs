//! Prometheus metrics for the time-sync status aggregator

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::{AtomicI64, AtomicU64};

use crate::status::{ChronyStatus, Synced};

/// Labels for per-class gpsd report counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReportLabels {
    pub class: String,
}

/// Synchronization verdict: 1 synced, 0 not synced, -1 unknown
pub static SYNCED: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Stratum of the local clock as reported by chrony
pub static CHRONY_STRATUM: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Offset of the last clock update in seconds
pub static CHRONY_LAST_OFFSET: Lazy<Gauge<f64, AtomicU64>> = Lazy::new(Gauge::default);

/// Failed chrony queries
pub static CHRONY_POLL_FAILURES: Lazy<Counter> = Lazy::new(Counter::default);

/// Received gpsd reports per class
pub static GPSD_REPORTS: Lazy<Family<ReportLabels, Counter>> = Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "time_sync_synced",
        "Synchronization verdict (1 synced, 0 not synced, -1 unknown)",
        SYNCED.clone(),
    );
    registry.register(
        "time_sync_chrony_stratum",
        "Stratum of the local clock as reported by chrony",
        CHRONY_STRATUM.clone(),
    );
    registry.register(
        "time_sync_chrony_last_offset_seconds",
        "Offset of the last clock update applied by chrony",
        CHRONY_LAST_OFFSET.clone(),
    );
    registry.register(
        "time_sync_chrony_poll_failures",
        "Number of failed chrony status queries",
        CHRONY_POLL_FAILURES.clone(),
    );
    registry.register(
        "time_sync_gpsd_reports",
        "Number of gpsd reports received per class",
        GPSD_REPORTS.clone(),
    );
    registry
});

/// Update the verdict and chrony gauges after a poll
pub fn record_chrony(chrony: Option<&ChronyStatus>, synced: Synced) {
    SYNCED.set(match synced {
        Synced::True => 1,
        Synced::False => 0,
        Synced::Unknown => -1,
    });

    match chrony {
        Some(status) => {
            CHRONY_STRATUM.set(i64::from(status.stratum));
            CHRONY_LAST_OFFSET.set(status.last_offset);
        }
        None => {
            CHRONY_POLL_FAILURES.inc();
        }
    }
}

pub fn inc_gpsd_reports(class: &str) {
    GPSD_REPORTS
        .get_or_create(&ReportLabels {
            class: class.to_string(),
        })
        .inc();
}
