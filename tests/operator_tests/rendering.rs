//! Rendered configuration artifacts

use slurm_operator::config::DatabaseCredentials;
use slurm_operator::crd::NodeCapability;
use slurm_operator::template::{render_init_sql, render_slurm_conf, render_slurmdbd_conf};

fn node(name: &str, cpus: u32, memory: u64) -> NodeCapability {
    NodeCapability {
        node_name: name.to_string(),
        cpus,
        threads_per_core: 1,
        real_memory_mb: memory,
        ..Default::default()
    }
}

fn credentials() -> DatabaseCredentials {
    DatabaseCredentials {
        user: "acct".to_string(),
        password: "s3cret".to_string(),
    }
}

#[test]
fn slurm_conf_with_accounting_points_at_slurmdbd() {
    let conf = render_slurm_conf("lab", true, &[node("b", 8, 16000), node("a", 4, 8000)]).unwrap();

    assert!(conf.contains("ClusterName=lab\n"));
    assert!(conf.contains("SlurmctldHost=lab-slurmctld\n"));
    assert!(conf.contains("AccountingStorageType=accounting_storage/slurmdbd"));
    assert!(conf.contains("AccountingStorageHost=lab-slurmdbd"));
    let a = conf.find("NodeName=lab-a ").unwrap();
    let b = conf.find("NodeName=lab-b ").unwrap();
    assert!(a < b, "node lines are sorted");
    assert!(conf.contains("NodeName=lab-b CPUs=8 RealMemory=16000 ThreadsPerCore=1"));
}

#[test]
fn slurm_conf_without_nodes_still_renders() {
    let conf = render_slurm_conf("lab", false, &[]).unwrap();
    assert!(conf.contains("AccountingStorageType=accounting_storage/none"));
    assert!(conf.contains("PartitionName=batch"));
    assert!(!conf.contains("NodeName=lab-"));
}

#[test]
fn slurmdbd_conf_uses_database_service() {
    let conf = render_slurmdbd_conf("lab", &credentials()).unwrap();
    assert!(conf.contains("DbdHost=lab-slurmdbd"));
    assert!(conf.contains("StorageHost=lab-mariadb"));
    assert!(conf.contains("StorageUser=acct"));
    assert!(conf.contains("StoragePass=s3cret"));
    assert!(conf.contains("StoragePort=3306"));
}

#[test]
fn init_script_grants_the_accounting_user() {
    let sql = render_init_sql(&credentials()).unwrap();
    assert!(sql.contains("TO 'acct'@'%'"));
    assert!(sql.contains("FLUSH PRIVILEGES;"));
}
