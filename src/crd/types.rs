//! Supporting types for the SlurmCluster CRD

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle state of a SlurmCluster
///
/// This is the only externally visible lifecycle signal.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ClusterState {
    /// Record accepted but not yet validated
    #[default]
    Uninitialized,
    /// Validated and waiting for (or undergoing) provisioning
    Pending,
    /// Every derived resource has been created
    Active,
    /// Validation failed; waits for a spec change
    Failed,
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Accounting database storage settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Size of the MariaDB data volume (Kubernetes quantity, e.g. "50G")
    #[serde(default)]
    pub storage_size: String,

    /// StorageClass of the MariaDB data volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Prefix shared by every node capability label
pub const LABEL_PREFIX: &str = "slurm.hpc.dev/";

/// Node capability label keys
pub mod labels {
    /// Hostname reported by `slurmd -C`
    pub const NODE_NAME: &str = "slurm.hpc.dev/nodename";
    /// Logical CPU count
    pub const CPUS: &str = "slurm.hpc.dev/cpus";
    /// Baseboard count
    pub const BOARDS: &str = "slurm.hpc.dev/boards";
    /// Sockets per baseboard
    pub const SOCKETS_PER_BOARD: &str = "slurm.hpc.dev/sockets_per_board";
    /// Cores per socket
    pub const CORES_PER_SOCKET: &str = "slurm.hpc.dev/cores_per_socket";
    /// Hardware threads per core
    pub const THREADS_PER_CORE: &str = "slurm.hpc.dev/threads_per_core";
    /// Usable memory in megabytes
    pub const REAL_MEMORY: &str = "slurm.hpc.dev/real_memory";
}

/// Hardware inventory of one worker node, as published in its labels
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeCapability {
    /// Kubernetes node name
    pub node_name: String,
    /// Hostname reported by the discovery agent, if any
    pub hostname: Option<String>,
    /// Logical CPU count
    pub cpus: u32,
    /// Baseboard count
    pub boards: Option<u32>,
    /// Sockets per baseboard
    pub sockets_per_board: Option<u32>,
    /// Cores per socket
    pub cores_per_socket: Option<u32>,
    /// Hardware threads per core
    pub threads_per_core: u32,
    /// Usable memory in megabytes
    pub real_memory_mb: u64,
}

impl NodeCapability {
    /// Read the capability labels of a node
    ///
    /// Returns `Ok(None)` when the node has not been labelled yet (any of
    /// cpus, real_memory or threads_per_core missing). A label that is
    /// present but not a number is an error.
    pub fn from_node(node: &Node) -> Result<Option<Self>, Error> {
        let node_name = node.name_any();
        let node_labels = node.labels();

        let (Some(cpus), Some(threads), Some(memory)) = (
            node_labels.get(labels::CPUS),
            node_labels.get(labels::THREADS_PER_CORE),
            node_labels.get(labels::REAL_MEMORY),
        ) else {
            return Ok(None);
        };

        let optional = |key: &str| -> Result<Option<u32>, Error> {
            node_labels
                .get(key)
                .map(|v| parse_label(&node_name, key, v))
                .transpose()
        };

        Ok(Some(Self {
            cpus: parse_label(&node_name, labels::CPUS, cpus)?,
            threads_per_core: parse_label(&node_name, labels::THREADS_PER_CORE, threads)?,
            real_memory_mb: parse_label(&node_name, labels::REAL_MEMORY, memory)?,
            boards: optional(labels::BOARDS)?,
            sockets_per_board: optional(labels::SOCKETS_PER_BOARD)?,
            cores_per_socket: optional(labels::CORES_PER_SOCKET)?,
            hostname: node_labels.get(labels::NODE_NAME).cloned(),
            node_name,
        }))
    }

    /// Encode this capability as node labels
    pub fn to_labels(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(hostname) = &self.hostname {
            out.insert(labels::NODE_NAME.to_string(), hostname.clone());
        }
        out.insert(labels::CPUS.to_string(), self.cpus.to_string());
        out.insert(
            labels::THREADS_PER_CORE.to_string(),
            self.threads_per_core.to_string(),
        );
        out.insert(
            labels::REAL_MEMORY.to_string(),
            self.real_memory_mb.to_string(),
        );
        for (key, value) in [
            (labels::BOARDS, self.boards),
            (labels::SOCKETS_PER_BOARD, self.sockets_per_board),
            (labels::CORES_PER_SOCKET, self.cores_per_socket),
        ] {
            if let Some(v) = value {
                out.insert(key.to_string(), v.to_string());
            }
        }
        out
    }
}

fn parse_label<T: std::str::FromStr>(node: &str, key: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| {
        Error::validation(format!(
            "node {node} has non-numeric label {key}={value:?}"
        ))
    })
}

/// True when the node carries a NoSchedule or NoExecute taint, or is cordoned
pub fn is_unschedulable(node: &Node) -> bool {
    let Some(spec) = node.spec.as_ref() else {
        return false;
    };
    if spec.unschedulable == Some(true) {
        return true;
    }
    spec.taints
        .as_ref()
        .map(|taints| {
            taints
                .iter()
                .any(|t| t.effect == "NoSchedule" || t.effect == "NoExecute")
        })
        .unwrap_or(false)
}

/// True when the node has published its memory label or is excluded from scheduling
///
/// This is the per-node predicate of the convergence gate.
pub fn is_converged(node: &Node) -> bool {
    node.labels().contains_key(labels::REAL_MEMORY) || is_unschedulable(node)
}
