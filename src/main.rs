//! Slurm operator - provisions Slurm clusters from SlurmCluster records

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use slurm_operator::client::{ensure_crd_installed, KubeClusterApi};
use slurm_operator::config::OperatorConfig;
use slurm_operator::controller::{Context, Reconciler};
use slurm_operator::crd::SlurmCluster;
use slurm_operator::labeler::{apply_labels, parse_slurmd_output, probe_slurmd};
use slurm_operator::retry::ConflictRetry;
use slurm_operator::telemetry::init_tracing;

/// Slurm operator - CRD-driven Slurm cluster lifecycle on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "slurm-operator", version, about, long_about = None)]
struct Cli {
    /// Print the SlurmCluster CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Operator configuration file (YAML)
    #[arg(long, env = "SLURM_OPERATOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the SlurmCluster controller (default mode)
    Controller,

    /// Publish this node's `slurmd -C` capabilities as node labels
    ///
    /// Run by the discovery DaemonSet on every worker. After labelling it
    /// stays up until terminated so the DaemonSet pod remains Running.
    LabelNode {
        /// Kubernetes node to label
        #[arg(long, env = "NODE_NAME")]
        node: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&SlurmCluster::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
        println!("{crd}");
        return Ok(());
    }

    let config = OperatorConfig::load(cli.config.as_deref())?;
    init_tracing(config.logging.format)?;

    match cli.command {
        Some(Commands::LabelNode { node }) => run_label_node(&node, &config).await,
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    ensure_crd_installed(&client).await?;

    let ctx = Context::new(Arc::new(KubeClusterApi::new(client)), Arc::new(config));
    let shutdown = CancellationToken::new();
    let reconciler = tokio::spawn(Reconciler::new(ctx).run(shutdown.clone()));

    shutdown_signal().await;
    tracing::info!("shutdown requested, finishing current pass");
    shutdown.cancel();
    reconciler.await?;
    Ok(())
}

async fn run_label_node(node: &str, config: &OperatorConfig) -> anyhow::Result<()> {
    let output = probe_slurmd().await?;
    let capability = parse_slurmd_output(&output, node)?;
    tracing::info!(?capability, "discovered node capabilities");

    let api = KubeClusterApi::new(Client::try_default().await?);
    apply_labels(&api, node, &capability, &ConflictRetry::from(&config.conflict_retry)).await?;

    shutdown_signal().await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
