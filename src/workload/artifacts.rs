//! Configuration artifacts (ConfigMaps)

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;

use super::BuildContext;
use crate::config::DatabaseCredentials;
use crate::crd::NodeCapability;
use crate::munge::MungeKey;
use crate::names::Component;
use crate::template;
use crate::Error;

/// Key of the munge secret inside its ConfigMap
pub const MUNGE_KEY_FILE: &str = "munge.key";
/// Key of slurm.conf
pub const SLURM_CONF_FILE: &str = "slurm.conf";
/// Key of slurmdbd.conf
pub const SLURMDBD_CONF_FILE: &str = "slurmdbd.conf";
/// Key of the MariaDB overrides
pub const MARIADB_OVERRIDES_FILE: &str = "overrides.cnf";
/// Key of the MariaDB init script
pub const MARIADB_INIT_FILE: &str = "slurm-init.sql";

fn text_config_map(
    ctx: &BuildContext<'_>,
    component: Component,
    file: &str,
    text: String,
) -> ConfigMap {
    ConfigMap {
        metadata: ctx.meta(&ctx.name(component), &BTreeMap::new()),
        data: Some(BTreeMap::from([(file.to_string(), text)])),
        ..Default::default()
    }
}

/// Binary ConfigMap holding the raw munge secret
pub fn munge_key(ctx: &BuildContext<'_>, key: &MungeKey) -> ConfigMap {
    ConfigMap {
        metadata: ctx.meta(&ctx.name(Component::MungeKey), &BTreeMap::new()),
        binary_data: Some(BTreeMap::from([(
            MUNGE_KEY_FILE.to_string(),
            ByteString(key.secret().to_vec()),
        )])),
        immutable: Some(true),
        ..Default::default()
    }
}

/// slurm.conf rendered from the labelled nodes
pub fn slurm_conf(
    ctx: &BuildContext<'_>,
    accounting: bool,
    nodes: &[NodeCapability],
) -> Result<ConfigMap, Error> {
    let text = template::render_slurm_conf(ctx.cluster, accounting, nodes)?;
    Ok(text_config_map(ctx, Component::SlurmConf, SLURM_CONF_FILE, text))
}

/// slurmdbd.conf pointing at the cluster's MariaDB
pub fn slurmdbd_conf(
    ctx: &BuildContext<'_>,
    credentials: &DatabaseCredentials,
) -> Result<ConfigMap, Error> {
    let text = template::render_slurmdbd_conf(ctx.cluster, credentials)?;
    Ok(text_config_map(ctx, Component::SlurmdbdConf, SLURMDBD_CONF_FILE, text))
}

/// MariaDB server overrides
pub fn mariadb_config(ctx: &BuildContext<'_>) -> ConfigMap {
    text_config_map(
        ctx,
        Component::MariaDbConfig,
        MARIADB_OVERRIDES_FILE,
        template::MARIADB_OVERRIDES.to_string(),
    )
}

/// MariaDB first-boot script granting the slurmdbd user
pub fn mariadb_init(
    ctx: &BuildContext<'_>,
    credentials: &DatabaseCredentials,
) -> Result<ConfigMap, Error> {
    let text = template::render_init_sql(credentials)?;
    Ok(text_config_map(ctx, Component::MariaDbInit, MARIADB_INIT_FILE, text))
}
