//! Builders for derived Kubernetes objects
//!
//! Every function here is pure: given the cluster name, target namespace and
//! operator configuration it returns the typed object to create. Names come
//! from [`crate::names`], images from [`crate::config::Images`].
//!
//! - [`artifacts`]: ConfigMaps carrying the munge key and rendered configs
//! - [`slurm`]: slurmctld, per-node slurmd, toolbox and the discovery agent
//! - [`accounting`]: MariaDB, slurmdbd and slurmrestd

pub mod accounting;
pub mod artifacts;
pub mod slurm;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, Namespace,
    PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::config::OperatorConfig;
use crate::names::{self, Component, CLUSTER_LABEL, MANAGED_BY, MANAGED_BY_LABEL};

/// Owner-only read/write, for mounted secrets
pub const SECRET_FILE_MODE: i32 = 0o600;

/// Volume names shared by the Slurm-family pods
pub mod volumes {
    /// Munge key ConfigMap
    pub const MUNGE_KEY: &str = "munge-key";
    /// munged socket directory shared with the sidecar
    pub const MUNGE_SOCKET: &str = "munge-socket";
    /// slurm.conf ConfigMap
    pub const SLURM_CONFIG: &str = "slurm-config";
    /// slurmdbd.conf ConfigMap
    pub const SLURMDBD_CONFIG: &str = "slurmdbd-config";
    /// Daemon state and spool
    pub const STATE: &str = "slurm-state";
}

/// Inputs shared by every builder
#[derive(Clone, Copy, Debug)]
pub struct BuildContext<'a> {
    /// SlurmCluster name
    pub cluster: &'a str,
    /// Target namespace
    pub namespace: &'a str,
    /// Operator configuration
    pub config: &'a OperatorConfig,
}

impl<'a> BuildContext<'a> {
    /// Create a context
    pub fn new(cluster: &'a str, namespace: &'a str, config: &'a OperatorConfig) -> Self {
        Self {
            cluster,
            namespace,
            config,
        }
    }

    /// `<cluster>-<component>`
    pub fn name(&self, component: Component) -> String {
        names::resource(self.cluster, component)
    }

    /// Labels stamped on every object owned by this cluster
    pub fn owner_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
            (CLUSTER_LABEL.to_string(), self.cluster.to_string()),
        ])
    }

    /// Metadata for a namespaced object with owner labels plus `extra`
    pub fn meta(&self, name: &str, extra: &BTreeMap<String, String>) -> ObjectMeta {
        let mut labels = self.owner_labels();
        labels.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        }
    }
}

/// `app=<value>` selector labels
pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

/// The target namespace
pub fn namespace(ctx: &BuildContext<'_>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(ctx.namespace.to_string()),
            labels: Some(ctx.owner_labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// ClusterIP Service selecting `selector` and exposing named TCP ports
pub fn service(
    ctx: &BuildContext<'_>,
    name: &str,
    selector: BTreeMap<String, String>,
    ports: &[(&str, i32)],
) -> Service {
    Service {
        metadata: ctx.meta(name, &selector),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port)| ServicePort {
                        name: Some(port_name.to_string()),
                        port: *port,
                        target_port: Some(IntOrString::Int(*port)),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Single-replica Deployment running `pod` under `app=<name>`
pub fn deployment(
    ctx: &BuildContext<'_>,
    name: &str,
    pod_labels: BTreeMap<String, String>,
    pod: PodSpec,
) -> Deployment {
    Deployment {
        metadata: ctx.meta(name, &pod_labels),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            template: pod_template(ctx, pod_labels, pod),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn pod_template(
    ctx: &BuildContext<'_>,
    pod_labels: BTreeMap<String, String>,
    pod: PodSpec,
) -> PodTemplateSpec {
    let mut labels = ctx.owner_labels();
    labels.extend(pod_labels);
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(pod),
    }
}

pub(crate) fn container_ports(ports: &[(&str, i32)]) -> Vec<ContainerPort> {
    ports
        .iter()
        .map(|(name, port)| ContainerPort {
            name: Some(name.to_string()),
            container_port: *port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect()
}

pub(crate) fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

pub(crate) fn mount(volume: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

pub(crate) fn config_map_volume(volume: &str, config_map: String, mode: Option<i32>) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map,
            default_mode: mode,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn empty_dir(volume: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Volumes every munge-authenticated pod carries
pub(crate) fn munge_volumes(ctx: &BuildContext<'_>) -> Vec<Volume> {
    vec![
        config_map_volume(
            volumes::MUNGE_KEY,
            ctx.name(Component::MungeKey),
            Some(SECRET_FILE_MODE),
        ),
        empty_dir(volumes::MUNGE_SOCKET),
    ]
}

/// Socket mount for containers that talk to munged
pub(crate) fn munge_socket_mount() -> VolumeMount {
    mount(volumes::MUNGE_SOCKET, "/run/munge", false)
}

/// munged as a native sidecar (restartable init container)
///
/// Holds the key read-only and serves the socket the Slurm daemons use.
pub(crate) fn munged_sidecar(ctx: &BuildContext<'_>) -> Container {
    Container {
        name: "munged".to_string(),
        image: Some(ctx.config.images.munged.clone()),
        restart_policy: Some("Always".to_string()),
        volume_mounts: Some(vec![
            mount(volumes::MUNGE_KEY, "/etc/munge", true),
            munge_socket_mount(),
        ]),
        ..Default::default()
    }
}
