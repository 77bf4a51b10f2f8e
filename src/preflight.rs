//! Preflight validation of a SlurmCluster before provisioning

use crate::crd::SlurmClusterSpec;
use crate::quantity::parse_bytes;
use crate::Error;

/// Smallest accepted accounting database volume, in bytes (45G)
pub const MIN_DATABASE_BYTES: f64 = 45e9;

/// Validate a cluster spec
///
/// Only accounting clusters are constrained: their database volume must be
/// a valid quantity of at least [`MIN_DATABASE_BYTES`]. The returned error is
/// a [`Error::Validation`] whose message is suitable for the record status.
pub fn check(spec: &SlurmClusterSpec) -> Result<(), Error> {
    if spec.namespace.is_empty() {
        return Err(Error::validation("spec.namespace must not be empty"));
    }
    if !spec.accounting_enabled {
        return Ok(());
    }

    let size = &spec.database.storage_size;
    let bytes = parse_bytes(size).map_err(|_| {
        Error::validation(format!("database storage size {size:?} is not a valid quantity"))
    })?;
    if bytes < MIN_DATABASE_BYTES {
        return Err(Error::validation(format!(
            "database storage size {size} is below the 45G minimum"
        )));
    }
    Ok(())
}

/// True when [`check`] passes
pub fn passes(spec: &SlurmClusterSpec) -> bool {
    check(spec).is_ok()
}
