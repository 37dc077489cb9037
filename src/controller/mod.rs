//! Controller module for node time-sync status
//!
//! This module contains the chrony poll loop, the Node reconciliation
//! logic and the Prometheus metrics.

pub mod metrics;
mod node;
mod poller;

pub use node::{
    annotation_key, build_annotations, time_synced_condition, KubeNodePatcher, NodePatcher,
    NodeReconciler, ANNOTATION_PREFIX, FIELD_MANAGER, TIME_SYNCED_CONDITION,
};
pub use poller::{StatusPoller, DEFAULT_INTERVAL};
