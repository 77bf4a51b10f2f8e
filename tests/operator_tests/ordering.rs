//! Creation and teardown ordering of the derived resource set

use slurm_operator::client::ResourceKind;
use slurm_operator::config::OperatorConfig;
use slurm_operator::crd::{DatabaseSpec, NodeCapability, SlurmClusterSpec};
use slurm_operator::munge::MungeKey;
use slurm_operator::names::{self, Component};
use slurm_operator::plan::{inventory, teardown_order, NodeInventory, ResourcePlan};
use slurm_operator::workload::BuildContext;

fn full_spec() -> SlurmClusterSpec {
    SlurmClusterSpec {
        namespace: "research".to_string(),
        accounting_enabled: true,
        gateway_enabled: true,
        database: DatabaseSpec {
            storage_size: "100Gi".to_string(),
            storage_class: Some("fast".to_string()),
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
                cpus: 8,
                threads_per_core: 2,
                real_memory_mb: 32000,
                ..Default::default()
            })
            .collect(),
    }
}

fn creation_order(spec: &SlurmClusterSpec, inv: &NodeInventory) -> Vec<Component> {
    let config = OperatorConfig::default();
    let ctx = BuildContext::new("lab", &spec.namespace, &config);
    let key = MungeKey::generate().expect("key");
    let mut plan = ResourcePlan::bootstrap(&ctx);
    plan.extend(ResourcePlan::for_cluster(spec, &ctx, inv, &key).expect("plan"));
    plan.entries().iter().map(|e| e.component).collect()
}

/// Story: every artifact a pod mounts exists before the pod is created
#[test]
fn story_artifacts_are_created_before_their_consumers() {
    let order = creation_order(&full_spec(), &nodes(&["gpu-1", "gpu-2"]));

    for (i, component) in order.iter().enumerate() {
        for artifact in component.mounts() {
            let at = order
                .iter()
                .position(|c| c == artifact)
                .unwrap_or_else(|| panic!("{artifact} mounted by {component} is never created"));
            assert!(at < i, "{artifact} must precede {component}");
        }
    }
}

/// Story: on deletion, nothing is removed while something still mounts it
#[test]
fn story_workloads_are_torn_down_before_their_artifacts() {
    let node_names = vec!["gpu-1".to_string(), "gpu-2".to_string()];
    let order: Vec<Component> = teardown_order(inventory("lab", "research", &node_names))
        .into_iter()
        .map(|e| e.component)
        .collect();

    for (i, component) in order.iter().enumerate() {
        for artifact in component.mounts() {
            let last_use = order.iter().rposition(|c| c == component).unwrap_or(i);
            let removed = order
                .iter()
                .position(|c| c == artifact)
                .unwrap_or_else(|| panic!("{artifact} missing from teardown"));
            assert!(last_use < removed, "{component} must go before {artifact}");
        }
    }
    assert_eq!(order.last(), Some(&Component::Namespace));
    assert_eq!(order.first(), Some(&Component::Slurmd));
}

#[test]
fn teardown_inventory_covers_every_created_object() {
    let spec = full_spec();
    let inv = nodes(&["a", "b", "c"]);
    let config = OperatorConfig::default();
    let ctx = BuildContext::new("lab", &spec.namespace, &config);
    let key = MungeKey::generate().expect("key");
    let mut plan = ResourcePlan::bootstrap(&ctx);
    plan.extend(ResourcePlan::for_cluster(&spec, &ctx, &inv, &key).expect("plan"));

    let known: Vec<_> = inventory("lab", "research", &inv.names)
        .into_iter()
        .map(|e| e.target)
        .collect();
    for entry in plan.entries() {
        let target = entry.object.resource_ref();
        assert!(known.contains(&target), "{target} would survive teardown");
    }
}

#[test]
fn compute_fan_out_is_one_per_node() {
    let order = creation_order(&full_spec(), &nodes(&["a", "b", "c", "d"]));
    // Deployment + Service per node
    assert_eq!(order.iter().filter(|c| **c == Component::Slurmd).count(), 8);
}

#[test]
fn derived_names_are_stable() {
    assert_eq!(names::resource("lab", Component::Slurmctld), "lab-slurmctld");
    assert_eq!(names::resource("lab", Component::MungeKey), "lab-munged");
    assert_eq!(names::compute("lab", "gpu-1"), names::compute("lab", "gpu-1"));
    let first = inventory("lab", "research", &["x".to_string()]);
    let second = inventory("lab", "research", &["x".to_string()]);
    assert_eq!(first, second);
    assert!(first
        .iter()
        .any(|e| e.target.kind == ResourceKind::Namespace && e.target.name == "research"));
}
