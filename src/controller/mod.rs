//! SlurmCluster controller
//!
//! [`reconcile_cluster`] advances one record through its lifecycle.
//! [`Reconciler`] drives it for every record on a fixed tick.

mod cluster;
mod reconciler;

pub use cluster::{reconcile_cluster, Context, Transition};
pub use reconciler::{PassReport, Reconciler};
