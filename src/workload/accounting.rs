//! Accounting stack: MariaDB, slurmdbd and the slurmrestd gateway

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSecurityContext, PodSpec,
    Service, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::slurm::CLUSTER_ENV;
use super::{
    app_labels, config_map_volume, container_ports, deployment, empty_dir, env, mount,
    munge_socket_mount, munge_volumes, munged_sidecar, pod_template, service, volumes,
    BuildContext, SECRET_FILE_MODE,
};
use crate::crd::DatabaseSpec;
use crate::names::Component;
use crate::template::ACCOUNTING_DATABASE;
use crate::{MARIADB_PORT, SLURMDBD_PORT, SLURMRESTD_PORT};

/// Fixed unprivileged identity slurmrestd runs as
pub const SLURMRESTD_UID: i64 = 64030;

const DATA_VOLUME: &str = "data";
const INIT_VOLUME: &str = "initdb";
const OVERRIDES_VOLUME: &str = "overrides";

/// MariaDB StatefulSet with a persistent data volume
pub fn mariadb(ctx: &BuildContext<'_>, storage: &DatabaseSpec) -> StatefulSet {
    let name = ctx.name(Component::MariaDb);
    let labels = app_labels(&name);
    let creds = &ctx.config.database;

    let pod = PodSpec {
        containers: vec![Container {
            name: "mariadb".to_string(),
            image: Some(ctx.config.images.mariadb.clone()),
            env: Some(vec![
                env("MARIADB_ALLOW_EMPTY_ROOT_PASSWORD", "true"),
                env("MARIADB_DATABASE", ACCOUNTING_DATABASE),
                env("MARIADB_USER", &creds.user),
                env("MARIADB_PASSWORD", &creds.password),
            ]),
            ports: Some(container_ports(&[("mariadb", MARIADB_PORT)])),
            volume_mounts: Some(vec![
                mount(DATA_VOLUME, "/var/lib/mysql", false),
                mount(INIT_VOLUME, "/docker-entrypoint-initdb.d", true),
                mount(OVERRIDES_VOLUME, "/etc/mysql/conf.d", true),
            ]),
            ..Default::default()
        }],
        volumes: Some(vec![
            config_map_volume(INIT_VOLUME, ctx.name(Component::MariaDbInit), None),
            config_map_volume(OVERRIDES_VOLUME, ctx.name(Component::MariaDbConfig), None),
        ]),
        ..Default::default()
    };

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(ctx.owner_labels()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: ctx.meta(&name, &labels),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            service_name: name.clone().into(),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: pod_template(ctx, labels, pod),
            volume_claim_templates: Some(vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Endpoint slurmdbd reaches MariaDB through
pub fn mariadb_service(ctx: &BuildContext<'_>) -> Service {
    let name = ctx.name(Component::MariaDb);
    service(ctx, &name, app_labels(&name), &[("mariadb", MARIADB_PORT)])
}

/// slurmdbd Deployment
pub fn slurmdbd(ctx: &BuildContext<'_>) -> Deployment {
    let name = ctx.name(Component::Slurmdbd);
    let mut vols = munge_volumes(ctx);
    vols.push(config_map_volume(
        volumes::SLURMDBD_CONFIG,
        ctx.name(Component::SlurmdbdConf),
        Some(SECRET_FILE_MODE),
    ));
    vols.push(empty_dir(volumes::STATE));

    let pod = PodSpec {
        hostname: Some(name.clone()),
        init_containers: Some(vec![munged_sidecar(ctx)]),
        containers: vec![Container {
            name: "slurmdbd".to_string(),
            image: Some(ctx.config.images.slurmdbd.clone()),
            env: Some(vec![env(CLUSTER_ENV, ctx.cluster)]),
            ports: Some(container_ports(&[("slurmdbd", SLURMDBD_PORT)])),
            volume_mounts: Some(vec![
                munge_socket_mount(),
                mount(volumes::SLURMDBD_CONFIG, "/etc/slurm", true),
                mount(volumes::STATE, "/var/lib/slurm", false),
            ]),
            ..Default::default()
        }],
        volumes: Some(vols),
        ..Default::default()
    };
    deployment(ctx, &name, app_labels(&name), pod)
}

/// Endpoint slurmctld reports accounting data to
pub fn slurmdbd_service(ctx: &BuildContext<'_>) -> Service {
    let name = ctx.name(Component::Slurmdbd);
    service(ctx, &name, app_labels(&name), &[("slurmdbd", SLURMDBD_PORT)])
}

/// slurmrestd gateway, running as a fixed non-root identity
pub fn slurmrestd(ctx: &BuildContext<'_>) -> Deployment {
    let name = ctx.name(Component::Slurmrestd);
    let mut vols = munge_volumes(ctx);
    vols.push(config_map_volume(
        volumes::SLURM_CONFIG,
        ctx.name(Component::SlurmConf),
        None,
    ));

    let pod = PodSpec {
        security_context: Some(PodSecurityContext {
            run_as_user: Some(SLURMRESTD_UID),
            run_as_group: Some(SLURMRESTD_UID),
            run_as_non_root: Some(true),
            ..Default::default()
        }),
        init_containers: Some(vec![munged_sidecar(ctx)]),
        containers: vec![Container {
            name: "slurmrestd".to_string(),
            image: Some(ctx.config.images.slurmrestd.clone()),
            env: Some(vec![env(CLUSTER_ENV, ctx.cluster)]),
            ports: Some(container_ports(&[("slurmrestd", SLURMRESTD_PORT)])),
            volume_mounts: Some(vec![
                munge_socket_mount(),
                mount(volumes::SLURM_CONFIG, "/etc/slurm", true),
            ]),
            ..Default::default()
        }],
        volumes: Some(vols),
        ..Default::default()
    };
    deployment(ctx, &name, app_labels(&name), pod)
}

/// REST endpoint
pub fn slurmrestd_service(ctx: &BuildContext<'_>) -> Service {
    let name = ctx.name(Component::Slurmrestd);
    service(ctx, &name, app_labels(&name), &[("slurmrestd", SLURMRESTD_PORT)])
}
