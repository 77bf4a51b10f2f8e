//! Slurm daemons: slurmctld, per-node slurmd, toolbox and node discovery

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, EnvVarSource, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector, PodSpec, SecurityContext,
    Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::{
    app_labels, config_map_volume, container_ports, deployment, empty_dir, env, mount,
    munge_socket_mount, munge_volumes, munged_sidecar, pod_template, service, volumes,
    BuildContext,
};
use crate::names::{self, Component};
use crate::{SLURMCTLD_PORT, SLURMD_PORT};

/// Environment variable carrying the cluster name into every Slurm container
pub const CLUSTER_ENV: &str = "SLURM_CLUSTER_NAME";

/// Node field compute pods are pinned on
const NODE_NAME_FIELD: &str = "metadata.name";

fn slurm_mounts() -> Vec<k8s_openapi::api::core::v1::VolumeMount> {
    vec![
        munge_socket_mount(),
        mount(volumes::SLURM_CONFIG, "/etc/slurm", true),
        mount(volumes::STATE, "/var/lib/slurm", false),
    ]
}

fn slurm_volumes(ctx: &BuildContext<'_>) -> Vec<k8s_openapi::api::core::v1::Volume> {
    let mut vols = munge_volumes(ctx);
    vols.push(config_map_volume(
        volumes::SLURM_CONFIG,
        ctx.name(Component::SlurmConf),
        None,
    ));
    vols.push(empty_dir(volumes::STATE));
    vols
}

fn privileged() -> SecurityContext {
    SecurityContext {
        privileged: Some(true),
        run_as_user: Some(0),
        ..Default::default()
    }
}

/// slurmctld control-plane Deployment
pub fn slurmctld(ctx: &BuildContext<'_>) -> Deployment {
    let name = ctx.name(Component::Slurmctld);
    let pod = PodSpec {
        hostname: Some(name.clone()),
        init_containers: Some(vec![munged_sidecar(ctx)]),
        containers: vec![Container {
            name: "slurmctld".to_string(),
            image: Some(ctx.config.images.slurmctld.clone()),
            env: Some(vec![env(CLUSTER_ENV, ctx.cluster)]),
            ports: Some(container_ports(&[("slurmctld", SLURMCTLD_PORT)])),
            volume_mounts: Some(slurm_mounts()),
            ..Default::default()
        }],
        volumes: Some(slurm_volumes(ctx)),
        ..Default::default()
    };
    deployment(ctx, &name, app_labels(&name), pod)
}

/// Stable endpoint for slurmctld
pub fn slurmctld_service(ctx: &BuildContext<'_>) -> Service {
    let name = ctx.name(Component::Slurmctld);
    service(ctx, &name, app_labels(&name), &[("slurmctld", SLURMCTLD_PORT)])
}

/// Required affinity to the Node object called `node`
///
/// Matches the object name rather than the hostname label, which may differ.
fn pinned_to(node: &str) -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_fields: Some(vec![NodeSelectorRequirement {
                        key: NODE_NAME_FIELD.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![node.to_string()]),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn compute_labels(ctx: &BuildContext<'_>, node: &str) -> BTreeMap<String, String> {
    let mut labels = app_labels(&names::compute_app(ctx.cluster));
    labels.insert("host".to_string(), node.to_string());
    labels
}

/// slurmd Deployment pinned to one worker node
///
/// The pod hostname is `<cluster>-<node>`, which is how slurm.conf names it.
pub fn slurmd(ctx: &BuildContext<'_>, node: &str) -> Deployment {
    let name = names::compute(ctx.cluster, node);
    let pod = PodSpec {
        hostname: Some(name.clone()),
        affinity: Some(pinned_to(node)),
        init_containers: Some(vec![munged_sidecar(ctx)]),
        containers: vec![Container {
            name: "slurmd".to_string(),
            image: Some(ctx.config.images.slurmd.clone()),
            env: Some(vec![env(CLUSTER_ENV, ctx.cluster)]),
            ports: Some(container_ports(&[("slurmd", SLURMD_PORT)])),
            security_context: Some(privileged()),
            volume_mounts: Some(slurm_mounts()),
            ..Default::default()
        }],
        volumes: Some(slurm_volumes(ctx)),
        ..Default::default()
    };
    deployment(ctx, &name, compute_labels(ctx, node), pod)
}

/// Endpoint resolving a compute pod's hostname
pub fn slurmd_service(ctx: &BuildContext<'_>, node: &str) -> Service {
    let name = names::compute(ctx.cluster, node);
    service(ctx, &name, compute_labels(ctx, node), &[("slurmd", SLURMD_PORT)])
}

/// Toolbox Deployment for running sinfo/srun/sacct by hand
pub fn toolbox(ctx: &BuildContext<'_>) -> Deployment {
    let name = ctx.name(Component::Toolbox);
    let pod = PodSpec {
        init_containers: Some(vec![munged_sidecar(ctx)]),
        containers: vec![Container {
            name: "toolbox".to_string(),
            image: Some(ctx.config.images.toolbox.clone()),
            env: Some(vec![env(CLUSTER_ENV, ctx.cluster)]),
            ports: Some(container_ports(&[
                ("slurmctld", SLURMCTLD_PORT),
                ("slurmd", SLURMD_PORT),
            ])),
            volume_mounts: Some(slurm_mounts()),
            ..Default::default()
        }],
        volumes: Some(slurm_volumes(ctx)),
        ..Default::default()
    };
    deployment(ctx, &name, app_labels(&name), pod)
}

/// DaemonSet running the capability discovery agent on every node
///
/// The agent runs `slurmd -C` and writes the result as node labels, which
/// the convergence gate waits for.
pub fn discovery(ctx: &BuildContext<'_>) -> DaemonSet {
    let name = ctx.name(Component::Discovery);
    let labels = app_labels(&name);
    let pod = PodSpec {
        service_account_name: Some(ctx.config.discovery_service_account.clone()),
        containers: vec![Container {
            name: "discovery".to_string(),
            image: Some(ctx.config.images.discovery.clone()),
            args: Some(vec!["label-node".to_string()]),
            env: Some(vec![
                env(CLUSTER_ENV, ctx.cluster),
                EnvVar {
                    name: "NODE_NAME".to_string(),
                    value_from: Some(EnvVarSource {
                        field_ref: Some(ObjectFieldSelector {
                            field_path: "spec.nodeName".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            security_context: Some(privileged()),
            ..Default::default()
        }],
        ..Default::default()
    };

    DaemonSet {
        metadata: ctx.meta(&name, &labels),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: pod_template(ctx, labels, pod),
            ..Default::default()
        }),
        ..Default::default()
    }
}
