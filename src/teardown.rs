//! Cluster teardown
//!
//! Deletes the derived resource set in reverse dependency order. Each delete
//! is preceded by an existence check, so running teardown again after a
//! partial pass only deletes what is left.

use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::client::{ClusterApi, ResourceKind, ResourceRef};
use crate::names::{self, Component};
use crate::plan::{inventory, teardown_order, InventoryEntry};
use crate::Error;

/// Namespaces that are never deleted, whoever asks
pub const RESERVED_NAMESPACES: &[&str] =
    &["default", "kube-system", "kube-public", "kube-node-lease"];

/// True for namespaces teardown must leave alone
pub fn is_reserved_namespace(namespace: &str) -> bool {
    RESERVED_NAMESPACES.contains(&namespace)
}

/// Counts from one teardown pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Objects deleted by this pass
    pub deleted: usize,
    /// Objects that were already gone
    pub absent: usize,
    /// The namespace was kept because it is reserved
    pub namespace_kept: bool,
}

/// Delete everything `cluster` may own in `namespace`
pub async fn teardown(
    api: &dyn ClusterApi,
    cluster: &str,
    namespace: &str,
) -> Result<TeardownReport, Error> {
    let nodes: Vec<String> = api.list_nodes().await?.iter().map(|n| n.name_any()).collect();
    let mut entries = inventory(cluster, namespace, &nodes);

    // compute objects of nodes that have left the cluster since provisioning
    let selector = names::compute_selector(cluster);
    for kind in [ResourceKind::Deployment, ResourceKind::Service] {
        for name in api.list_names(kind, namespace, &selector).await? {
            let target = ResourceRef::namespaced(kind, name, namespace);
            if !entries.iter().any(|e| e.target == target) {
                entries.push(InventoryEntry {
                    component: Component::Slurmd,
                    target,
                });
            }
        }
    }

    let mut report = TeardownReport::default();
    for entry in teardown_order(entries) {
        let target = &entry.target;
        if target.kind == ResourceKind::Namespace && is_reserved_namespace(&target.name) {
            warn!(namespace = %target.name, "not deleting reserved namespace");
            report.namespace_kept = true;
            continue;
        }
        if !api.exists(target).await? {
            report.absent += 1;
            continue;
        }
        api.delete(target).await?;
        debug!(component = %entry.component, resource = %target, "deleted");
        report.deleted += 1;
    }

    info!(
        cluster = %cluster,
        namespace = %namespace,
        deleted = report.deleted,
        "cluster torn down"
    );
    Ok(report)
}
