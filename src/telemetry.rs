//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::Error;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,slurm_operator=debug,kube=info,tower=warn,hyper=warn";

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]. JSON output carries the current
/// span so every line of a reconcile is tagged with its cluster.
pub fn init_tracing(format: LogFormat) -> Result<(), Error> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| Error::internal(format!("failed to initialize tracing subscriber: {e}")))
}
