//! Chrony poll and node reconcile loop
//!
//! Each tick queries chrony, stores the result together with the derived
//! verdict and then reconciles the snapshot onto the Node. Errors never end
//! the loop; the next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn, Level};

use super::metrics;
use super::node::NodeReconciler;
use crate::error::Error;
use crate::sources::ChronySource;
use crate::status::{StatusStore, Synced};

/// Default poll interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic chrony poller driving the node reconciler
pub struct StatusPoller {
    chrony: ChronySource,
    store: Arc<StatusStore>,
    reconciler: NodeReconciler,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        chrony: ChronySource,
        store: Arc<StatusStore>,
        reconciler: NodeReconciler,
        interval: Duration,
    ) -> Self {
        Self {
            chrony,
            store,
            reconciler,
            interval,
        }
    }

    /// Run for the lifetime of the process
    pub async fn run(mut self) {
        info!(
            "Starting status poller for node {} (interval {:?})",
            self.reconciler.node_name(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Poll chrony once and reconcile the Node
    #[instrument(skip(self))]
    pub async fn tick(&mut self) -> Synced {
        let chrony = match self.chrony.poll().await {
            Ok(status) => {
                info!(
                    "Received update from Chrony: ref {} ({:08X}), stratum {}, sync source {}, {} source(s)",
                    status.ref_name,
                    status.ref_id,
                    status.stratum,
                    status.sync_source().unwrap_or("none"),
                    status.sources.len()
                );
                Some(status)
            }
            Err(e) => {
                log_failure("Failed to query chrony status", &e);
                None
            }
        };

        let synced = self.store.record_chrony(chrony);

        let snapshot = self.store.get();
        metrics::record_chrony(snapshot.chrony.as_ref(), synced);

        if let Err(e) = self.reconciler.reconcile(&snapshot).await {
            log_failure("Failed to update node status", &e);
        }

        synced
    }
}

/// Log level for a failed tick step
fn failure_level(e: &Error) -> Level {
    if e.is_retriable() {
        Level::WARN
    } else {
        Level::ERROR
    }
}

fn log_failure(context: &str, e: &Error) {
    if failure_level(e) == Level::WARN {
        warn!("{}: {}. Retrying next tick", context, e);
    } else {
        error!("{}: {}", context, e);
    }
}
