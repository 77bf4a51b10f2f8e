//! Preflight validation and storage quantities

use slurm_operator::crd::{DatabaseSpec, SlurmClusterSpec};
use slurm_operator::preflight;
use slurm_operator::quantity::parse_bytes;

fn accounting(size: &str) -> SlurmClusterSpec {
    SlurmClusterSpec {
        namespace: "research".to_string(),
        accounting_enabled: true,
        gateway_enabled: false,
        database: DatabaseSpec {
            storage_size: size.to_string(),
            storage_class: None,
        },
    }
}

#[test]
fn storage_boundary() {
    assert!(!preflight::passes(&accounting("44G")));
    assert!(preflight::passes(&accounting("45G")));
    assert!(preflight::passes(&accounting("46G")));
    assert!(preflight::passes(&accounting("45000M")));
    assert!(!preflight::passes(&accounting("44999M")));
}

#[test]
fn accounting_off_needs_no_storage() {
    let mut spec = accounting("not a size");
    spec.accounting_enabled = false;
    assert!(preflight::passes(&spec));
}

#[test]
fn quantity_suffixes() {
    assert_eq!(parse_bytes("1Ki").unwrap(), 1024.0);
    assert_eq!(parse_bytes("1k").unwrap(), 1000.0);
    assert_eq!(parse_bytes("2e3").unwrap(), 2000.0);
    assert_eq!(parse_bytes("1.5G").unwrap(), 1.5e9);
    assert!(parse_bytes("1KB").is_err());
    assert!(parse_bytes("").is_err());
}
