//! Cluster provisioning
//!
//! Walks the [`ResourcePlan`] for one SlurmCluster, creating each object in
//! order and running the gate attached to it. Every create tolerates
//! AlreadyExists, so a pass interrupted half way is resumed by simply
//! running it again. Nothing is rolled back on failure.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::client::{create_if_absent, ClusterApi};
use crate::config::OperatorConfig;
use crate::crd::{is_converged, SlurmCluster};
use crate::gate::{GateOutcome, ReadinessGate};
use crate::munge::MungeKey;
use crate::plan::{Gate, NodeInventory, ResourcePlan, Write};
use crate::workload::BuildContext;
use crate::Error;

/// Counts from one provisioning pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Objects created by this pass
    pub created: usize,
    /// Objects that already existed
    pub existing: usize,
    /// Config artifacts written with server-side apply
    pub applied: usize,
    /// Gates that ran out of attempts and were passed anyway
    pub gates_exhausted: usize,
}

/// Provisions the derived resource set of a cluster
pub struct Provisioner<'a> {
    api: &'a dyn ClusterApi,
    config: &'a OperatorConfig,
    artifact_gate: ReadinessGate,
    convergence_gate: ReadinessGate,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner using the configured gates
    pub fn new(api: &'a dyn ClusterApi, config: &'a OperatorConfig) -> Self {
        Self {
            api,
            config,
            artifact_gate: ReadinessGate::from(&config.artifact_gate),
            convergence_gate: ReadinessGate::from(&config.convergence),
        }
    }

    /// Create every derived object for `cluster`
    pub async fn provision(&self, cluster: &SlurmCluster) -> Result<ProvisionReport, Error> {
        let name = cluster.name_any();
        let ctx = BuildContext::new(&name, cluster.target_namespace(), self.config);
        let mut report = ProvisionReport::default();

        self.apply(&ResourcePlan::bootstrap(&ctx), &mut report).await?;

        let nodes = NodeInventory::from_nodes(&self.api.list_nodes().await?);
        debug!(
            nodes = nodes.names.len(),
            labelled = nodes.capabilities.len(),
            "node inventory"
        );

        let key = MungeKey::generate()?;
        let plan = ResourcePlan::for_cluster(&cluster.spec, &ctx, &nodes, &key)?;
        self.apply(&plan, &mut report).await?;

        info!(
            created = report.created,
            existing = report.existing,
            applied = report.applied,
            "cluster provisioned"
        );
        Ok(report)
    }

    async fn apply(&self, plan: &ResourcePlan, report: &mut ProvisionReport) -> Result<(), Error> {
        for entry in plan.entries() {
            let target = entry.object.resource_ref();
            match entry.write {
                Write::Apply => {
                    self.api.apply(&entry.object).await?;
                    debug!(component = %entry.component, resource = %target, "applied");
                    report.applied += 1;
                }
                Write::CreateOnce => {
                    if create_if_absent(self.api, &entry.object).await? {
                        debug!(component = %entry.component, resource = %target, "created");
                        report.created += 1;
                    } else {
                        report.existing += 1;
                    }
                }
            }

            let outcome = match entry.gate {
                Gate::None => continue,
                Gate::ArtifactVisible => {
                    self.artifact_gate
                        .wait(&target.to_string(), || self.api.exists(&target))
                        .await?
                }
                Gate::NodesConverged => {
                    self.convergence_gate
                        .wait("node capability labels", || self.nodes_converged())
                        .await?
                }
            };
            if outcome == GateOutcome::Exhausted {
                report.gates_exhausted += 1;
            }
        }
        Ok(())
    }

    async fn nodes_converged(&self) -> Result<bool, Error> {
        let nodes = self.api.list_nodes().await?;
        let pending = nodes.iter().filter(|n| !is_converged(n)).count();
        if pending > 0 {
            debug!(pending, total = nodes.len(), "waiting for node labels");
        }
        Ok(pending == 0)
    }
}
