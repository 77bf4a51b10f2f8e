//! Per-record lifecycle state machine
//!
//! ```text
//! Uninitialized --preflight ok--> Pending --provisioned--> Active
//!       |                            ^
//!       +--preflight fails--> Failed-+ (back to Uninitialized once valid)
//! ```
//!
//! Deletion takes priority over every state: the derived resources are
//! torn down and the teardown finalizer released.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::client::ClusterApi;
use crate::config::OperatorConfig;
use crate::crd::{ClusterState, SlurmCluster, SlurmClusterStatus, TEARDOWN_FINALIZER};
use crate::preflight;
use crate::provision::Provisioner;
use crate::teardown::teardown;
use crate::Error;

/// Shared controller context
#[derive(Clone)]
pub struct Context {
    /// Kubernetes API
    pub api: Arc<dyn ClusterApi>,
    /// Operator configuration
    pub config: Arc<OperatorConfig>,
}

impl Context {
    /// Create a context
    pub fn new(api: Arc<dyn ClusterApi>, config: Arc<OperatorConfig>) -> Self {
        Self { api, config }
    }
}

/// What one reconcile did to a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do in the current state
    Unchanged,
    /// The record was moved to a new state
    Moved(ClusterState),
    /// Resources were torn down and the teardown finalizer released
    Released,
}

/// Reconcile a single SlurmCluster
///
/// Returns an error when provisioning or teardown failed part way. The
/// record's state is left as it was so the next pass retries.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile_cluster(cluster: &SlurmCluster, ctx: &Context) -> Result<Transition, Error> {
    let api = ctx.api.as_ref();

    if cluster.deletion_requested() {
        if !cluster.has_teardown_finalizer() {
            debug!("deletion requested, nothing held");
            return Ok(Transition::Unchanged);
        }
        info!(namespace = %cluster.target_namespace(), "tearing down cluster");
        teardown(api, &cluster.name_any(), cluster.target_namespace()).await?;
        release_finalizer(api, cluster).await?;
        return Ok(Transition::Released);
    }

    let state = cluster.state();
    debug!(%state, "current state");

    match state {
        ClusterState::Uninitialized => match preflight::check(&cluster.spec) {
            Ok(()) => {
                let status = SlurmClusterStatus::with_state(ClusterState::Pending);
                set_state(api, cluster, status).await?;
                ensure_finalizer(api, cluster).await?;
                Ok(Transition::Moved(ClusterState::Pending))
            }
            Err(e) => {
                warn!(error = %e, "preflight failed");
                let status =
                    SlurmClusterStatus::with_state(ClusterState::Failed).message(e.to_string());
                set_state(api, cluster, status).await?;
                Ok(Transition::Moved(ClusterState::Failed))
            }
        },
        ClusterState::Pending => {
            // a crash between the status and finalizer writes leaves Pending
            // without the finalizer
            ensure_finalizer(api, cluster).await?;
            Provisioner::new(api, &ctx.config).provision(cluster).await?;
            set_state(api, cluster, SlurmClusterStatus::with_state(ClusterState::Active)).await?;
            Ok(Transition::Moved(ClusterState::Active))
        }
        ClusterState::Active => Ok(Transition::Unchanged),
        ClusterState::Failed => {
            if preflight::passes(&cluster.spec) {
                info!("spec is valid again, restarting provisioning");
                set_state(
                    api,
                    cluster,
                    SlurmClusterStatus::with_state(ClusterState::Uninitialized),
                )
                .await?;
                Ok(Transition::Moved(ClusterState::Uninitialized))
            } else {
                Ok(Transition::Unchanged)
            }
        }
    }
}

async fn set_state(
    api: &dyn ClusterApi,
    cluster: &SlurmCluster,
    status: SlurmClusterStatus,
) -> Result<(), Error> {
    info!(from = %cluster.state(), to = %status.state, "state transition");
    api.patch_status(cluster, &status).await
}

/// Drop the teardown finalizer, keeping any held by other controllers
async fn release_finalizer(api: &dyn ClusterApi, cluster: &SlurmCluster) -> Result<(), Error> {
    let remaining: Vec<String> = cluster
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != TEARDOWN_FINALIZER)
        .cloned()
        .collect();
    api.set_finalizers(cluster, remaining).await
}

/// Add the teardown finalizer unless it is already held
async fn ensure_finalizer(api: &dyn ClusterApi, cluster: &SlurmCluster) -> Result<(), Error> {
    if cluster.has_teardown_finalizer() {
        return Ok(());
    }
    let mut finalizers = cluster.finalizers().to_vec();
    finalizers.push(TEARDOWN_FINALIZER.to_string());
    api.set_finalizers(cluster, finalizers).await
}
