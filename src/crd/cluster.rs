//! SlurmCluster Custom Resource Definition
//!
//! A SlurmCluster is the declarative record of one Slurm installation. The
//! operator realises it as a namespace full of derived objects (config
//! artifacts, workloads, services) and tears them down again when the record
//! is deleted.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ClusterState, DatabaseSpec};

/// Finalizer the operator holds on every record it has started provisioning
pub const TEARDOWN_FINALIZER: &str = "slurm.hpc.dev/teardown";

/// Specification for a SlurmCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "slurm.hpc.dev",
    version = "v1alpha1",
    kind = "SlurmCluster",
    plural = "slurmclusters",
    shortname = "slc",
    status = "SlurmClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.namespace"}"#,
    printcolumn = r#"{"name":"Accounting","type":"boolean","jsonPath":".spec.accountingEnabled"}"#,
    printcolumn = r#"{"name":"Gateway","type":"boolean","jsonPath":".spec.gatewayEnabled"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SlurmClusterSpec {
    /// Namespace the derived resources are created in
    pub namespace: String,

    /// Deploy slurmdbd and MariaDB for job accounting
    #[serde(default)]
    pub accounting_enabled: bool,

    /// Deploy slurmrestd (only honoured together with accounting)
    #[serde(default)]
    pub gateway_enabled: bool,

    /// Accounting database storage
    #[serde(default)]
    pub database: DatabaseSpec,
}

impl SlurmClusterSpec {
    /// The REST gateway is deployed only when accounting is also enabled
    pub fn gateway_active(&self) -> bool {
        self.accounting_enabled && self.gateway_enabled
    }
}

/// Status for a SlurmCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlurmClusterStatus {
    /// Current lifecycle state
    #[serde(default)]
    pub state: ClusterState,

    /// Reason for the last failed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SlurmClusterStatus {
    /// Create a new status with the given state
    pub fn with_state(state: ClusterState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl SlurmCluster {
    /// Current lifecycle state, `Uninitialized` when no status was written yet
    pub fn state(&self) -> ClusterState {
        self.status
            .as_ref()
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Deletion has been requested by the user
    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The operator's finalizer is present
    pub fn has_teardown_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == TEARDOWN_FINALIZER)
    }

    /// Namespace the derived resources live in
    pub fn target_namespace(&self) -> &str {
        &self.spec.namespace
    }

    /// `namespace/name` key identifying this record
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}
