//! Slurm operator - CRD-driven provisioning of Slurm clusters on Kubernetes
//!
//! A `SlurmCluster` record describes one Slurm installation. The operator
//! validates it, creates its derived resource set (namespace, munge key,
//! configuration artifacts, slurmctld, one slurmd per node, optional
//! accounting and REST gateway) and tears all of it down when the record is
//! deleted.
//!
//! # Modules
//!
//! - [`crd`] - SlurmCluster custom resource and node capability labels
//! - [`controller`] - lifecycle state machine and reconcile loop
//! - [`provision`] / [`teardown`] - creation and deletion of the derived set
//! - [`plan`] - declarative table of what is created, in which order
//! - [`workload`] - typed builders for every derived Kubernetes object
//! - [`template`] - slurm.conf, slurmdbd.conf and MariaDB artifact rendering
//! - [`gate`] / [`retry`] - polling and retry primitives
//! - [`client`] - the Kubernetes API seam
//! - [`labeler`] - `slurmd -C` capability discovery for worker nodes
//! - [`config`] - operator configuration file

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod gate;
pub mod labeler;
pub mod munge;
pub mod names;
pub mod plan;
pub mod preflight;
pub mod provision;
pub mod quantity;
pub mod retry;
pub mod teardown;
pub mod telemetry;
pub mod template;
pub mod workload;

#[cfg(test)]
mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// slurmctld listen port
pub const SLURMCTLD_PORT: i32 = 6817;

/// slurmd listen port
pub const SLURMD_PORT: i32 = 6818;

/// slurmdbd listen port
pub const SLURMDBD_PORT: i32 = 6819;

/// slurmrestd listen port
pub const SLURMRESTD_PORT: i32 = 6820;

/// MariaDB listen port
pub const MARIADB_PORT: i32 = 3306;
