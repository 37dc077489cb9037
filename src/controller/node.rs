//! Node status reconciliation
//!
//! Pushes the derived time-sync status onto the cluster Node object:
//!
//! - **Condition**: a single `TimeSynced` entry written to `status.conditions`.
//!   The patch is a JSON merge patch, which replaces the whole list.
//! - **Annotations**: status fields under the `time-sync.riasc.eu/` prefix,
//!   merged into `metadata.annotations`.
//!
//! Failures are returned to the caller, which retries on the next tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::status::{StatusSnapshot, Synced};

/// Prefix of all annotation keys written to the Node
pub const ANNOTATION_PREFIX: &str = "time-sync.riasc.eu";

/// Type of the Node condition maintained by the reconciler
pub const TIME_SYNCED_CONDITION: &str = "TimeSynced";

/// Field manager used for patches
pub const FIELD_MANAGER: &str = "time-sync-status";

/// Writes status onto a cluster Node
#[async_trait]
pub trait NodePatcher: Send + Sync {
    /// Replace the Node's `status.conditions` list
    async fn patch_conditions(&self, node_name: &str, conditions: Vec<NodeCondition>)
        -> Result<()>;

    /// Merge annotations into the Node's metadata
    async fn patch_annotations(
        &self,
        node_name: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()>;
}

/// [`NodePatcher`] backed by the Kubernetes API
pub struct KubeNodePatcher {
    api: Api<Node>,
}

impl KubeNodePatcher {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodePatcher for KubeNodePatcher {
    async fn patch_conditions(
        &self,
        node_name: &str,
        conditions: Vec<NodeCondition>,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "status": {
                "conditions": conditions
            }
        });

        self.api
            .patch_status(
                node_name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(Error::KubeError)?;

        Ok(())
    }

    async fn patch_annotations(
        &self,
        node_name: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": annotations
            }
        });

        self.api
            .patch(
                node_name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(Error::KubeError)?;

        Ok(())
    }
}

/// Build the `TimeSynced` condition for a verdict
pub fn time_synced_condition(
    synced: Synced,
    last_transition: DateTime<Utc>,
    heartbeat: DateTime<Utc>,
) -> NodeCondition {
    let (status, reason, message) = match synced {
        Synced::True => ("True", "ChronyHasSyncSource", "Time of node is synchronized"),
        Synced::False => (
            "False",
            "ChronyHasNoSyncSource",
            "Time of node is not synchronized",
        ),
        Synced::Unknown => (
            "Unknown",
            "ChronyNotRunning",
            "Time of node is not synchronized",
        ),
    };

    NodeCondition {
        type_: TIME_SYNCED_CONDITION.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_heartbeat_time: Some(Time(heartbeat)),
        last_transition_time: Some(Time(last_transition)),
    }
}

/// Full annotation key for a status field name
pub fn annotation_key(field: &str) -> String {
    format!("{}/{}", ANNOTATION_PREFIX, field.replace('_', "-"))
}

/// Build the Node annotations for a snapshot
pub fn build_annotations(snapshot: &StatusSnapshot) -> BTreeMap<String, String> {
    let mut fields: Vec<(&str, String)> = vec![("synced", snapshot.synced.to_string())];

    if let Some(chrony) = &snapshot.chrony {
        fields.push(("stratum", chrony.stratum.to_string()));
        fields.push(("ref_name", chrony.ref_name.clone()));
        fields.push(("leap_status", chrony.leap_status.clone()));
    }

    if let Some(tpv) = snapshot.gpsd.as_ref().and_then(|gpsd| gpsd.tpv()) {
        if let Some(lat) = tpv.lat {
            fields.push(("position_latitude", float_value(lat)));
        }
        if let Some(lon) = tpv.lon {
            fields.push(("position_longitude", float_value(lon)));
        }
        if let Some(alt) = tpv.alt {
            fields.push(("position_altitude", float_value(alt)));
        }
        fields.push(("gps_fix", tpv.fix().as_str().to_string()));
        fields.push(("gps_status", tpv.fix_status().as_str().to_string()));
        if let Some(time) = &tpv.time {
            fields.push(("last_gps_time", time.clone()));
        }
    }

    fields
        .into_iter()
        .map(|(field, value)| (annotation_key(field), value))
        .collect()
}

/// Render a float with at least one decimal, `170.0` rather than `170`
fn float_value(value: f64) -> String {
    format!("{:?}", value)
}

/// Reconciles the snapshot onto one Node
pub struct NodeReconciler {
    patcher: Arc<dyn NodePatcher>,
    node_name: String,
    /// Last verdict and when it was first observed
    transition: Option<(Synced, DateTime<Utc>)>,
}

impl NodeReconciler {
    pub fn new(patcher: Arc<dyn NodePatcher>, node_name: impl Into<String>) -> Self {
        Self {
            patcher,
            node_name: node_name.into(),
            transition: None,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Build the condition, keeping the transition time while the verdict is unchanged
    fn condition_for(&mut self, synced: Synced, now: DateTime<Utc>) -> NodeCondition {
        let since = match self.transition {
            Some((previous, since)) if previous == synced => since,
            _ => {
                self.transition = Some((synced, now));
                now
            }
        };
        time_synced_condition(synced, since, now)
    }

    /// Patch condition and annotations of the Node
    ///
    /// Both patches are attempted on every call. The first error is returned.
    #[instrument(skip(self, snapshot), fields(node = %self.node_name, synced = %snapshot.synced))]
    pub async fn reconcile(&mut self, snapshot: &StatusSnapshot) -> Result<()> {
        let condition = self.condition_for(snapshot.synced, Utc::now());

        let condition_result = self
            .patcher
            .patch_conditions(&self.node_name, vec![condition])
            .await;
        match &condition_result {
            Ok(()) => info!("Updated node condition"),
            Err(e) => warn!("Failed to update node condition: {}", e),
        }

        let annotations = build_annotations(snapshot);
        debug!("Node annotations: {:?}", annotations);

        self.patcher
            .patch_annotations(&self.node_name, annotations)
            .await?;
        info!("Updated node annotations");

        condition_result
    }
}
