//! Declarative resource plan
//!
//! The derived resource set of a cluster is data: an ordered table of
//! [`PlannedResource`] entries for creation and an [`inventory`] of every
//! object that may exist, sorted into teardown order by component. Both are
//! driven by the same per-component dependency tables below.
//!
//! Creation happens in two stages. The bootstrap stage creates the namespace
//! and the discovery DaemonSet, then waits for nodes to converge. The main
//! stage needs the converged node labels to render slurm.conf, so it is
//! planned only after the gate has passed.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::warn;

use crate::client::{DerivedObject, ResourceKind, ResourceRef};
use crate::crd::{NodeCapability, SlurmClusterSpec};
use crate::munge::MungeKey;
use crate::names::{self, Component};
use crate::workload::{self, accounting, artifacts, slurm, BuildContext};
use crate::Error;

/// Wait performed after an entry has been created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Continue immediately
    None,
    /// Wait until the created artifact can be read back
    ArtifactVisible,
    /// Wait until every node is labelled or unschedulable
    NodesConverged,
}

/// How an entry is written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Write {
    /// Create once; an existing object is left as it is
    CreateOnce,
    /// Server-side apply on every pass so the stored copy follows the
    /// current render
    Apply,
}

/// One object to create, in order
#[derive(Clone, Debug)]
pub struct PlannedResource {
    /// Component the object belongs to
    pub component: Component,
    /// The object itself
    pub object: DerivedObject,
    /// Wait performed after creating it
    pub gate: Gate,
    /// Create-once or re-apply
    pub write: Write,
}

impl PlannedResource {
    fn new(component: Component, object: DerivedObject) -> Self {
        Self {
            component,
            object,
            gate: Gate::None,
            write: Write::CreateOnce,
        }
    }

    fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    fn reapplied(mut self) -> Self {
        self.write = Write::Apply;
        self
    }
}

/// Ordered creation table
#[derive(Clone, Debug, Default)]
pub struct ResourcePlan {
    entries: Vec<PlannedResource>,
}

/// Worker nodes as seen after convergence
#[derive(Clone, Debug, Default)]
pub struct NodeInventory {
    /// Every node name, labelled or not
    pub names: Vec<String>,
    /// Capabilities of the labelled nodes, sorted by node name
    pub capabilities: Vec<NodeCapability>,
}

impl NodeInventory {
    /// Read capability labels from a node list
    ///
    /// A node with a malformed capability label is treated as unlabelled: it
    /// still gets a compute workload but no line in slurm.conf.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut names: Vec<String> = nodes.iter().map(|n| n.name_any()).collect();
        names.sort();
        let mut capabilities = Vec::new();
        for node in nodes {
            match NodeCapability::from_node(node) {
                Ok(Some(cap)) => capabilities.push(cap),
                Ok(None) => {}
                Err(e) => warn!(node = %node.name_any(), error = %e, "ignoring node labels"),
            }
        }
        capabilities.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        Self {
            names,
            capabilities,
        }
    }
}

impl ResourcePlan {
    /// Namespace and discovery agent, gated on node convergence
    pub fn bootstrap(ctx: &BuildContext<'_>) -> Self {
        Self {
            entries: vec![
                PlannedResource::new(
                    Component::Namespace,
                    DerivedObject::Namespace(workload::namespace(ctx)),
                ),
                PlannedResource::new(
                    Component::Discovery,
                    DerivedObject::DaemonSet(slurm::discovery(ctx)),
                )
                .gated(Gate::NodesConverged),
            ],
        }
    }

    /// Everything after convergence, in creation order
    ///
    /// One slurmd Deployment and Service is planned per known node, while
    /// slurm.conf describes the labelled ones. The text config artifacts are
    /// re-applied on every pass; the munge key is created once. Accounting
    /// components follow `accounting_enabled`, the gateway additionally
    /// needs `gateway_enabled`.
    pub fn for_cluster(
        spec: &SlurmClusterSpec,
        ctx: &BuildContext<'_>,
        nodes: &NodeInventory,
        key: &MungeKey,
    ) -> Result<Self, Error> {
        let creds = &ctx.config.database;
        let mut entries = vec![
            PlannedResource::new(
                Component::MungeKey,
                DerivedObject::ConfigMap(artifacts::munge_key(ctx, key)),
            )
            .gated(Gate::ArtifactVisible),
            PlannedResource::new(
                Component::SlurmConf,
                DerivedObject::ConfigMap(artifacts::slurm_conf(
                    ctx,
                    spec.accounting_enabled,
                    &nodes.capabilities,
                )?),
            )
            .gated(Gate::ArtifactVisible)
            .reapplied(),
            PlannedResource::new(
                Component::SlurmdbdConf,
                DerivedObject::ConfigMap(artifacts::slurmdbd_conf(ctx, creds)?),
            )
            .gated(Gate::ArtifactVisible)
            .reapplied(),
            PlannedResource::new(
                Component::MariaDbInit,
                DerivedObject::ConfigMap(artifacts::mariadb_init(ctx, creds)?),
            )
            .gated(Gate::ArtifactVisible)
            .reapplied(),
            PlannedResource::new(
                Component::MariaDbConfig,
                DerivedObject::ConfigMap(artifacts::mariadb_config(ctx)),
            )
            .gated(Gate::ArtifactVisible)
            .reapplied(),
            PlannedResource::new(
                Component::Slurmctld,
                DerivedObject::Deployment(slurm::slurmctld(ctx)),
            ),
            PlannedResource::new(
                Component::Slurmctld,
                DerivedObject::Service(slurm::slurmctld_service(ctx)),
            ),
        ];

        for node in &nodes.names {
            entries.push(PlannedResource::new(
                Component::Slurmd,
                DerivedObject::Deployment(slurm::slurmd(ctx, node)),
            ));
            entries.push(PlannedResource::new(
                Component::Slurmd,
                DerivedObject::Service(slurm::slurmd_service(ctx, node)),
            ));
        }

        entries.push(PlannedResource::new(
            Component::Toolbox,
            DerivedObject::Deployment(slurm::toolbox(ctx)),
        ));

        if spec.accounting_enabled {
            entries.extend([
                PlannedResource::new(
                    Component::MariaDb,
                    DerivedObject::StatefulSet(accounting::mariadb(ctx, &spec.database)),
                ),
                PlannedResource::new(
                    Component::MariaDb,
                    DerivedObject::Service(accounting::mariadb_service(ctx)),
                ),
                PlannedResource::new(
                    Component::Slurmdbd,
                    DerivedObject::Deployment(accounting::slurmdbd(ctx)),
                ),
                PlannedResource::new(
                    Component::Slurmdbd,
                    DerivedObject::Service(accounting::slurmdbd_service(ctx)),
                ),
            ]);
        }

        if spec.gateway_active() {
            entries.extend([
                PlannedResource::new(
                    Component::Slurmrestd,
                    DerivedObject::Deployment(accounting::slurmrestd(ctx)),
                ),
                PlannedResource::new(
                    Component::Slurmrestd,
                    DerivedObject::Service(accounting::slurmrestd_service(ctx)),
                ),
            ]);
        }

        Ok(Self { entries })
    }

    /// Entries in creation order
    pub fn entries(&self) -> &[PlannedResource] {
        &self.entries
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is planned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append another plan's entries
    pub fn extend(&mut self, other: ResourcePlan) {
        self.entries.extend(other.entries);
    }
}

impl Component {
    /// Artifacts mounted by this component's pods
    pub fn mounts(self) -> &'static [Component] {
        use Component::*;
        match self {
            Slurmctld | Slurmd | Toolbox | Slurmrestd => &[MungeKey, SlurmConf],
            Slurmdbd => &[MungeKey, SlurmdbdConf],
            MariaDb => &[MariaDbConfig, MariaDbInit],
            _ => &[],
        }
    }

    /// Components that must exist before this one is created
    pub fn requires(self) -> &'static [Component] {
        use Component::*;
        match self {
            Namespace => &[],
            Discovery | MungeKey | SlurmdbdConf | MariaDbConfig | MariaDbInit => &[Namespace],
            SlurmConf => &[Namespace, Discovery],
            Slurmctld | Toolbox => &[MungeKey, SlurmConf],
            Slurmd => &[MungeKey, SlurmConf, Slurmctld],
            MariaDb => &[MariaDbConfig, MariaDbInit],
            Slurmdbd => &[MungeKey, SlurmdbdConf, MariaDb],
            Slurmrestd => &[MungeKey, SlurmConf, Slurmdbd],
        }
    }

    /// Position in teardown; lower phases are deleted first
    pub fn teardown_phase(self) -> u8 {
        use Component::*;
        match self {
            Slurmd => 0,
            Discovery => 1,
            Toolbox => 2,
            Slurmrestd => 3,
            MariaDb => 4,
            Slurmdbd => 5,
            Slurmctld => 6,
            SlurmConf | SlurmdbdConf | MariaDbConfig | MariaDbInit => 7,
            MungeKey => 8,
            Namespace => 9,
        }
    }
}

/// One object that may exist for a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Component the object belongs to
    pub component: Component,
    /// Object identity
    pub target: ResourceRef,
}

/// Every object a cluster may own, optional components included
///
/// `nodes` are the node names compute workloads may have been created for.
pub fn inventory(cluster: &str, namespace: &str, nodes: &[String]) -> Vec<InventoryEntry> {
    let entry = |component: Component, kind: ResourceKind, name: String| InventoryEntry {
        component,
        target: ResourceRef::namespaced(kind, name, namespace),
    };
    let singleton = |component: Component, kind: ResourceKind| {
        entry(component, kind, names::resource(cluster, component))
    };

    let mut out = vec![InventoryEntry {
        component: Component::Namespace,
        target: ResourceRef::namespace(namespace),
    }];
    out.push(singleton(Component::Discovery, ResourceKind::DaemonSet));
    for component in [
        Component::MungeKey,
        Component::SlurmConf,
        Component::SlurmdbdConf,
        Component::MariaDbInit,
        Component::MariaDbConfig,
    ] {
        out.push(singleton(component, ResourceKind::ConfigMap));
    }
    out.push(singleton(Component::Slurmctld, ResourceKind::Deployment));
    out.push(singleton(Component::Slurmctld, ResourceKind::Service));
    for node in nodes {
        let name = names::compute(cluster, node);
        out.push(entry(Component::Slurmd, ResourceKind::Deployment, name.clone()));
        out.push(entry(Component::Slurmd, ResourceKind::Service, name));
    }
    out.push(singleton(Component::Toolbox, ResourceKind::Deployment));
    out.push(singleton(Component::MariaDb, ResourceKind::StatefulSet));
    out.push(singleton(Component::MariaDb, ResourceKind::Service));
    out.push(singleton(Component::Slurmdbd, ResourceKind::Deployment));
    out.push(singleton(Component::Slurmdbd, ResourceKind::Service));
    out.push(singleton(Component::Slurmrestd, ResourceKind::Deployment));
    out.push(singleton(Component::Slurmrestd, ResourceKind::Service));
    out
}

/// Sort an inventory into deletion order
///
/// The sort is stable, so a workload stays ahead of its Service.
pub fn teardown_order(mut entries: Vec<InventoryEntry>) -> Vec<InventoryEntry> {
    entries.sort_by_key(|e| e.component.teardown_phase());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::crd::DatabaseSpec;

    fn spec(accounting: bool, gateway: bool) -> SlurmClusterSpec {
        SlurmClusterSpec {
            namespace: "hpc-ns".to_string(),
            accounting_enabled: accounting,
            gateway_enabled: gateway,
            database: DatabaseSpec {
                storage_size: "50G".to_string(),
                storage_class: None,
            },
        }
    }

    fn nodes(names: &[&str]) -> NodeInventory {
        NodeInventory {
            names: names.iter().map(|n| n.to_string()).collect(),
            capabilities: names
                .iter()
                .map(|n| NodeCapability {
                    node_name: n.to_string(),
                    cpus: 4,
                    threads_per_core: 1,
                    real_memory_mb: 8000,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn full_plan(
        spec: &SlurmClusterSpec,
        config: &OperatorConfig,
        inv: &NodeInventory,
    ) -> ResourcePlan {
        let ctx = BuildContext::new("hpc", &spec.namespace, config);
        let key = MungeKey::generate().unwrap();
        let mut plan = ResourcePlan::bootstrap(&ctx);
        plan.extend(ResourcePlan::for_cluster(spec, &ctx, inv, &key).unwrap());
        plan
    }

    fn position(components: &[Component], c: Component) -> Option<usize> {
        components.iter().position(|x| *x == c)
    }

    /// Story: nothing is created before the things it needs
    #[test]
    fn story_creation_order_respects_dependencies() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(true, true), &config, &nodes(&["n1", "n2"]));
        let order: Vec<Component> = plan.entries().iter().map(|e| e.component).collect();

        for (i, component) in order.iter().enumerate() {
            for dep in component.requires() {
                let at = position(&order, *dep)
                    .unwrap_or_else(|| panic!("{component} requires {dep} which is not planned"));
                assert!(at < i, "{dep} must be created before {component}");
            }
        }
    }

    #[test]
    fn control_plane_precedes_every_compute_workload() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(false, false), &config, &nodes(&["a", "b", "c"]));
        let order: Vec<Component> = plan.entries().iter().map(|e| e.component).collect();
        let ctld = position(&order, Component::Slurmctld).unwrap();
        let first_compute = position(&order, Component::Slurmd).unwrap();
        assert!(ctld < first_compute);
    }

    #[test]
    fn artifacts_are_gated_and_discovery_waits_for_nodes() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(true, false), &config, &nodes(&["a"]));
        for entry in plan.entries() {
            let expected = match entry.object {
                DerivedObject::ConfigMap(_) => Gate::ArtifactVisible,
                DerivedObject::DaemonSet(_) => Gate::NodesConverged,
                _ => Gate::None,
            };
            assert_eq!(entry.gate, expected, "{:?}", entry.object.resource_ref());
        }
    }

    #[test]
    fn gateway_needs_accounting() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(false, true), &config, &nodes(&["a"]));
        assert!(plan
            .entries()
            .iter()
            .all(|e| !matches!(
                e.component,
                Component::Slurmrestd | Component::MariaDb | Component::Slurmdbd
            )));
    }

    #[test]
    fn compute_fan_out_matches_known_nodes() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(false, false), &config, &nodes(&["a", "b", "c"]));
        let compute = plan
            .entries()
            .iter()
            .filter(|e| e.component == Component::Slurmd)
            .count();
        assert_eq!(compute, 6);
    }

    /// Story: a node without capability labels still gets its slurmd, it
    /// just falls back to the default node line in slurm.conf
    #[test]
    fn story_unlabelled_node_is_still_fanned_out() {
        let config = OperatorConfig::default();
        let mut inv = nodes(&["a", "b"]);
        inv.names.push("c".to_string());
        let plan = full_plan(&spec(false, false), &config, &inv);

        let compute: Vec<String> = plan
            .entries()
            .iter()
            .filter(|e| e.component == Component::Slurmd)
            .map(|e| e.object.resource_ref().name)
            .collect();
        assert_eq!(compute.len(), 6);
        assert!(compute.contains(&"hpc-c".to_string()));
    }

    #[test]
    fn only_text_configs_are_reapplied() {
        let config = OperatorConfig::default();
        let plan = full_plan(&spec(true, true), &config, &nodes(&["a"]));
        let reapplied: Vec<Component> = plan
            .entries()
            .iter()
            .filter(|e| e.write == Write::Apply)
            .map(|e| e.component)
            .collect();
        assert_eq!(
            reapplied,
            vec![
                Component::SlurmConf,
                Component::SlurmdbdConf,
                Component::MariaDbInit,
                Component::MariaDbConfig,
            ]
        );
    }

    #[test]
    fn malformed_labels_do_not_block_the_inventory() {
        use crate::crd::labels;
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

        let node = |name: &str, cpus: &str| Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    [
                        (labels::CPUS, cpus),
                        (labels::THREADS_PER_CORE, "1"),
                        (labels::REAL_MEMORY, "4000"),
                    ]
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };

        let inv = NodeInventory::from_nodes(&[node("good", "4"), node("bad", "four")]);
        assert_eq!(inv.names, vec!["bad".to_string(), "good".to_string()]);
        assert_eq!(inv.capabilities.len(), 1);
        assert_eq!(inv.capabilities[0].node_name, "good");
    }

    /// Story: workloads go before the artifacts they mount, and the
    /// namespace goes last
    #[test]
    fn story_teardown_order_reverses_dependencies() {
        let order = teardown_order(inventory("hpc", "hpc-ns", &["n1".to_string()]));
        let components: Vec<Component> = order.iter().map(|e| e.component).collect();

        for (i, component) in components.iter().enumerate() {
            for mounted in component.mounts() {
                let last_use = i;
                let deleted_at = position(&components, *mounted).unwrap();
                assert!(last_use < deleted_at, "{component} must go before {mounted}");
            }
        }
        assert_eq!(order.last().unwrap().target, ResourceRef::namespace("hpc-ns"));
        assert_eq!(components[0], Component::Slurmd);
    }

    #[test]
    fn teardown_follows_documented_component_order() {
        let order = teardown_order(inventory("hpc", "hpc-ns", &[]));
        let mut seen: Vec<Component> = Vec::new();
        for e in &order {
            if seen.last() != Some(&e.component) {
                seen.push(e.component);
            }
        }
        let phases: Vec<u8> = seen.iter().map(|c| c.teardown_phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
        assert_eq!(
            &seen[..7],
            &[
                Component::Discovery,
                Component::Toolbox,
                Component::Slurmrestd,
                Component::MariaDb,
                Component::Slurmdbd,
                Component::Slurmctld,
                Component::SlurmConf,
            ]
        );
    }

    #[test]
    fn inventory_covers_everything_the_plan_creates() {
        let config = OperatorConfig::default();
        let inv = nodes(&["a", "b"]);
        let plan = full_plan(&spec(true, true), &config, &inv);
        let known: Vec<ResourceRef> = inventory("hpc", "hpc-ns", &inv.names)
            .into_iter()
            .map(|e| e.target)
            .collect();
        for entry in plan.entries() {
            let r = entry.object.resource_ref();
            assert!(known.contains(&r), "{r} missing from inventory");
        }
        assert_eq!(plan.len(), known.len());
    }
}
