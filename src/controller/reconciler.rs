//! Periodic reconcile loop
//!
//! One task walks every SlurmCluster sequentially on the first tick and then
//! every `everyNTicks` ticks. A failing record is logged and skipped; it never
//! stops the rest of the pass. Records whose provisioning keeps failing are
//! spaced out with [`ProvisionBackoff`].

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cluster::{reconcile_cluster, Context, Transition};
use crate::crd::ClusterState;
use crate::retry::ProvisionBackoff;

/// Counts from one pass over all records
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records reconciled without error
    pub succeeded: usize,
    /// Records whose reconcile returned an error
    pub failed: usize,
    /// Records skipped while backing off
    pub skipped: usize,
}

/// Drives [`reconcile_cluster`] for every record
pub struct Reconciler {
    ctx: Context,
    backoff: ProvisionBackoff,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(ctx: Context) -> Self {
        let backoff = ProvisionBackoff::from(&ctx.config.reconcile.backoff);
        Self { ctx, backoff }
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Cancellation is observed between ticks, so a pass in progress always
    /// completes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let tick = self.ctx.config.reconcile.tick();
        let every = self.ctx.config.reconcile.every_n_ticks.max(1);
        info!(?tick, every_n_ticks = every, "reconcile loop started");

        let mut ticks: u64 = 0;
        loop {
            if ticks % every == 0 {
                let report = self.reconcile_all().await;
                debug!(?report, "reconcile pass finished");
            }
            ticks = ticks.wrapping_add(1);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }
        info!("reconcile loop stopped");
    }

    /// Reconcile every record once
    pub async fn reconcile_all(&mut self) -> PassReport {
        let mut report = PassReport::default();
        let clusters = match self.ctx.api.list_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(error = %e, "failed to list clusters");
                return report;
            }
        };

        for cluster in &clusters {
            let key = cluster.key();
            let provisioning =
                !cluster.deletion_requested() && cluster.state() == ClusterState::Pending;

            if provisioning && self.backoff.is_backing_off(&key) {
                debug!(cluster = %key, failures = self.backoff.failures(&key), "backing off");
                report.skipped += 1;
                continue;
            }

            match reconcile_cluster(cluster, &self.ctx).await {
                Ok(transition) => {
                    if transition != Transition::Unchanged {
                        self.backoff.clear(&key);
                    }
                    report.succeeded += 1;
                }
                Err(e) if provisioning => {
                    let delay = self.backoff.record_failure(&key);
                    error!(
                        cluster = %key,
                        error = %e,
                        failures = self.backoff.failures(&key),
                        retry_in = ?delay,
                        "provisioning failed"
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    error!(
                        cluster = %key,
                        state = %cluster.state(),
                        error = %e,
                        "reconcile failed"
                    );
                    report.failed += 1;
                }
            }
        }

        let live: Vec<String> = clusters.iter().map(|c| c.key()).collect();
        self.backoff.retain_keys(live.iter().map(String::as_str));
        if !clusters.is_empty() {
            debug!(
                clusters = clusters.len(),
                names = ?clusters.iter().map(|c| c.name_any()).collect::<Vec<_>>(),
                "pass complete"
            );
        }
        report
    }
}
