//! Node capability labelling
//!
//! The discovery DaemonSet runs `slurm-operator label-node` on every worker.
//! It asks `slurmd -C` for the machine's hardware layout and publishes it as
//! node labels, which the controller later folds into slurm.conf.

use kube::ResourceExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::client::ClusterApi;
use crate::crd::NodeCapability;
use crate::retry::ConflictRetry;
use crate::Error;

/// Parse the output of `slurmd -C`
///
/// The output is whitespace separated `Key=Value` tokens. The reported
/// `NodeName` is ignored in favour of `hostname`, which is the Kubernetes
/// node name. Tokens that are not `Key=Value` or carry a malformed number are
/// skipped. CPUs, ThreadsPerCore and RealMemory are required.
pub fn parse_slurmd_output(text: &str, hostname: &str) -> Result<NodeCapability, Error> {
    let mut cap = NodeCapability {
        node_name: hostname.to_string(),
        hostname: Some(hostname.to_string()),
        ..Default::default()
    };
    let (mut cpus, mut threads, mut memory) = (None, None, None);

    for token in text.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        if value.contains('=') {
            continue;
        }
        let number = || -> Option<u32> {
            value
                .parse()
                .map_err(|_| warn!(key, value, "skipping malformed slurmd -C value"))
                .ok()
        };
        match key {
            "CPUs" => cpus = number(),
            "Boards" => cap.boards = number(),
            "SocketsPerBoard" => cap.sockets_per_board = number(),
            "CoresPerSocket" => cap.cores_per_socket = number(),
            "ThreadsPerCore" => threads = number(),
            "RealMemory" => memory = number(),
            _ => {}
        }
    }

    let missing =
        |field: &str| Error::validation(format!("slurmd -C output has no usable {field}"));
    cap.cpus = cpus.ok_or_else(|| missing("CPUs"))?;
    cap.threads_per_core = threads.ok_or_else(|| missing("ThreadsPerCore"))?;
    cap.real_memory_mb = u64::from(memory.ok_or_else(|| missing("RealMemory"))?);
    Ok(cap)
}

/// Run `slurmd -C` and return its standard output
pub async fn probe_slurmd() -> Result<String, Error> {
    let output = Command::new("slurmd")
        .arg("-C")
        .output()
        .await
        .map_err(|e| Error::internal(format!("failed to run slurmd -C: {e}")))?;
    if !output.status.success() {
        return Err(Error::internal(format!(
            "slurmd -C exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| Error::internal(format!("slurmd -C output is not UTF-8: {e}")))
}

/// Merge capability labels into a node
///
/// Other labels on the node are left untouched. Conflicting writes are
/// retried with a fresh read; a node that disappears yields
/// [`Error::NodeNotFound`].
pub async fn apply_labels(
    api: &dyn ClusterApi,
    node: &str,
    capability: &NodeCapability,
    retry: &ConflictRetry,
) -> Result<(), Error> {
    let labels = capability.to_labels();
    let labels = &labels;

    let updated = retry
        .update(&format!("node {node}"), || async move {
            let mut current = api.get_node(node).await?;
            current.labels_mut().extend(labels.clone());
            api.replace_node(&current).await
        })
        .await
        .map_err(|e| {
            if e.is_not_found() {
                Error::NodeNotFound(node.to_string())
            } else {
                e
            }
        })?;

    debug!(node, version = ?updated.resource_version(), "labels written");
    info!(node, cpus = capability.cpus, memory_mb = capability.real_memory_mb, "node labelled");
    Ok(())
}
