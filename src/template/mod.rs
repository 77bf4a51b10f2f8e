//! Configuration artifact rendering
//!
//! Renders `slurm.conf`, `slurmdbd.conf` and the MariaDB bootstrap files
//! with minijinja. Templates are compiled into the binary.

use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::config::DatabaseCredentials;
use crate::crd::NodeCapability;
use crate::names;
use crate::{Error, MARIADB_PORT, SLURMCTLD_PORT, SLURMDBD_PORT, SLURMD_PORT};

const SLURM_CONF_TEMPLATE: &str = include_str!("../../templates/slurm.conf.j2");
const SLURMDBD_CONF_TEMPLATE: &str = include_str!("../../templates/slurmdbd.conf.j2");
const INIT_SQL_TEMPLATE: &str = include_str!("../../templates/slurm-init.sql.j2");

/// MariaDB server overrides, shipped verbatim
pub const MARIADB_OVERRIDES: &str = include_str!("../../templates/mariadb-overrides.cnf");

/// Database slurmdbd stores accounting data in
pub const ACCOUNTING_DATABASE: &str = "slurmdbd";

#[derive(Debug, Serialize)]
struct NodeLine {
    name: String,
    cpus: u32,
    real_memory: u64,
    threads_per_core: u32,
}

fn environment() -> Result<Environment<'static>, Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    for (name, source) in [
        ("slurm.conf", SLURM_CONF_TEMPLATE),
        ("slurmdbd.conf", SLURMDBD_CONF_TEMPLATE),
        ("slurm-init.sql", INIT_SQL_TEMPLATE),
    ] {
        env.add_template(name, source)
            .map_err(|e| Error::template(format!("{name}: {e}")))?;
    }
    Ok(env)
}

fn render(name: &str, ctx: minijinja::Value) -> Result<String, Error> {
    let env = environment()?;
    let template = env
        .get_template(name)
        .map_err(|e| Error::template(format!("{name}: {e}")))?;
    template
        .render(ctx)
        .map_err(|e| Error::template(format!("{name}: {e}")))
}

/// Render the scheduler configuration
///
/// One `NodeName` line is emitted per capability, named after the compute
/// pod hostname `<cluster>-<node>`. Nodes are sorted by name so the output
/// only changes when the inventory does.
pub fn render_slurm_conf(
    cluster_name: &str,
    accounting: bool,
    nodes: &[NodeCapability],
) -> Result<String, Error> {
    let mut lines: Vec<NodeLine> = nodes
        .iter()
        .map(|n| NodeLine {
            name: names::compute(cluster_name, &n.node_name),
            cpus: n.cpus,
            real_memory: n.real_memory_mb,
            threads_per_core: n.threads_per_core,
        })
        .collect();
    lines.sort_by(|a, b| a.name.cmp(&b.name));

    render(
        "slurm.conf",
        context! {
            cluster_name => cluster_name,
            accounting => accounting,
            nodes => lines,
            slurmctld_port => SLURMCTLD_PORT,
            slurmd_port => SLURMD_PORT,
            slurmdbd_port => SLURMDBD_PORT,
        },
    )
}

/// Render the accounting daemon configuration
pub fn render_slurmdbd_conf(
    cluster_name: &str,
    credentials: &DatabaseCredentials,
) -> Result<String, Error> {
    render(
        "slurmdbd.conf",
        context! {
            cluster_name => cluster_name,
            database => ACCOUNTING_DATABASE,
            user => &credentials.user,
            password => &credentials.password,
            slurmdbd_port => SLURMDBD_PORT,
            mariadb_port => MARIADB_PORT,
        },
    )
}

/// Render the MariaDB privilege-grant script
pub fn render_init_sql(credentials: &DatabaseCredentials) -> Result<String, Error> {
    render("slurm-init.sql", context! { user => &credentials.user })
}
