//! Custom Resource Definitions for the Slurm operator

mod cluster;
mod types;

pub use cluster::{SlurmCluster, SlurmClusterSpec, SlurmClusterStatus, TEARDOWN_FINALIZER};
pub use types::{
    is_converged, is_unschedulable, labels, ClusterState, DatabaseSpec, NodeCapability,
    LABEL_PREFIX,
};
