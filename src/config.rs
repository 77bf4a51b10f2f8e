//! Operator configuration
//!
//! Loaded once at startup from an optional YAML file and passed by `Arc` to
//! the controller, the orchestrators and the object builders. Every field has
//! a default, so an empty file (or no file) yields a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Top-level operator configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Log output settings
    pub logging: LoggingConfig,
    /// Reconcile loop cadence and provisioning backoff
    pub reconcile: ReconcileConfig,
    /// Gate applied after each config artifact is written
    pub artifact_gate: GateConfig,
    /// Gate waiting for every node to publish its capability labels
    pub convergence: GateConfig,
    /// Retry cadence for optimistic-concurrency conflicts
    pub conflict_retry: ConflictRetryConfig,
    /// Container images for every derived workload
    pub images: Images,
    /// ServiceAccount the discovery DaemonSet runs as
    pub discovery_service_account: String,
    /// Credentials slurmdbd uses against MariaDB
    pub database: DatabaseCredentials,
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Logging section
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
}

/// Reconcile loop section
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Length of one tick
    pub tick_seconds: u64,
    /// A pass runs on the first tick and then every N ticks
    pub every_n_ticks: u64,
    /// Backoff for records whose provisioning keeps failing
    pub backoff: BackoffConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            every_n_ticks: 10,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Tick length as a Duration
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

/// Exponential backoff bounds
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_seconds: u64,
    /// Upper bound on the delay
    pub max_seconds: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_seconds: 10,
            max_seconds: 300,
        }
    }
}

/// What a readiness gate does when it runs out of attempts
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Log a warning and carry on
    Proceed,
    /// Fail the current provisioning pass
    Fail,
}

/// Readiness gate section
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Delay between polls
    pub interval_seconds: u64,
    /// Number of polls before giving up (0 polls forever)
    pub max_attempts: u32,
    /// Behaviour once attempts are exhausted
    pub on_exhausted: ExhaustionPolicy,
}

impl GateConfig {
    /// Poll interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Conflict retry section
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConflictRetryConfig {
    /// Delay between attempts
    pub interval_millis: u64,
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            interval_millis: 1000,
        }
    }
}

/// Container images
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Images {
    /// Node capability discovery agent
    pub discovery: String,
    /// munged sidecar
    pub munged: String,
    /// slurmctld
    pub slurmctld: String,
    /// slurmd
    pub slurmd: String,
    /// Toolbox shell
    pub toolbox: String,
    /// MariaDB
    pub mariadb: String,
    /// slurmdbd
    pub slurmdbd: String,
    /// slurmrestd
    pub slurmrestd: String,
}

impl Default for Images {
    fn default() -> Self {
        let slurm = |name: &str| format!("ghcr.io/slurm-operator/{name}:latest");
        Self {
            discovery: slurm("slurm-operator"),
            munged: slurm("munged"),
            slurmctld: slurm("slurmctld"),
            slurmd: slurm("slurmd"),
            toolbox: slurm("toolbox"),
            mariadb: "docker.io/library/mariadb:11".to_string(),
            slurmdbd: slurm("slurmdbd"),
            slurmrestd: slurm("slurmrestd"),
        }
    }
}

/// Database credentials
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseCredentials {
    /// MariaDB user
    pub user: String,
    /// MariaDB password
    pub password: String,
}

impl Default for DatabaseCredentials {
    fn default() -> Self {
        Self {
            user: "slurm".to_string(),
            password: "slurm".to_string(),
        }
    }
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            reconcile: ReconcileConfig::default(),
            artifact_gate: GateConfig {
                interval_seconds: 1,
                max_attempts: 30,
                on_exhausted: ExhaustionPolicy::Proceed,
            },
            convergence: GateConfig {
                interval_seconds: 1,
                max_attempts: 600,
                on_exhausted: ExhaustionPolicy::Fail,
            },
            conflict_retry: ConflictRetryConfig::default(),
            images: Images::default(),
            discovery_service_account: "slurm-operator-discovery".to_string(),
            database: DatabaseCredentials::default(),
        }
    }
}

impl OperatorConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Reject settings the operator cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let images = [
            ("discovery", &self.images.discovery),
            ("munged", &self.images.munged),
            ("slurmctld", &self.images.slurmctld),
            ("slurmd", &self.images.slurmd),
            ("toolbox", &self.images.toolbox),
            ("mariadb", &self.images.mariadb),
            ("slurmdbd", &self.images.slurmdbd),
            ("slurmrestd", &self.images.slurmrestd),
        ];
        if let Some((name, _)) = images.iter().find(|(_, image)| image.trim().is_empty()) {
            return Err(Error::config(format!("images.{name} must not be empty")));
        }

        if self.reconcile.tick_seconds == 0 {
            return Err(Error::config("reconcile.tickSeconds must be positive"));
        }
        if self.reconcile.every_n_ticks == 0 {
            return Err(Error::config("reconcile.everyNTicks must be positive"));
        }
        if self.reconcile.backoff.initial_seconds > self.reconcile.backoff.max_seconds {
            return Err(Error::config(
                "reconcile.backoff.initialSeconds exceeds maxSeconds",
            ));
        }
        if self.artifact_gate.interval_seconds == 0 {
            return Err(Error::config("artifactGate.intervalSeconds must be positive"));
        }
        if self.convergence.interval_seconds == 0 {
            return Err(Error::config("convergence.intervalSeconds must be positive"));
        }
        if self.conflict_retry.interval_millis == 0 {
            return Err(Error::config("conflictRetry.intervalMillis must be positive"));
        }
        if self.discovery_service_account.trim().is_empty() {
            return Err(Error::config("discoveryServiceAccount must not be empty"));
        }
        if self.database.user.trim().is_empty() {
            return Err(Error::config("database.user must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = OperatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.artifact_gate.max_attempts, 30);
        assert_eq!(config.artifact_gate.on_exhausted, ExhaustionPolicy::Proceed);
        assert_eq!(config.convergence.on_exhausted, ExhaustionPolicy::Fail);
        assert_eq!(config.reconcile.every_n_ticks, 10);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = OperatorConfig::from_yaml(
            r#"
logging:
  format: text
convergence:
  intervalSeconds: 2
  maxAttempts: 0
  onExhausted: proceed
images:
  slurmd: registry.local/slurmd:24.05
"#,
        )
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.convergence.interval(), Duration::from_secs(2));
        assert_eq!(config.convergence.max_attempts, 0);
        assert_eq!(config.images.slurmd, "registry.local/slurmd:24.05");
        assert_eq!(config.images.slurmctld, Images::default().slurmctld);
        assert_eq!(config.artifact_gate, OperatorConfig::default().artifact_gate);
    }

    #[test]
    fn empty_text_is_default() {
        assert_eq!(OperatorConfig::from_yaml("").unwrap(), OperatorConfig::default());
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = OperatorConfig::from_yaml("images:\n  mariadb: \"\"\n").unwrap_err();
        assert!(err.to_string().contains("images.mariadb"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = OperatorConfig::from_yaml("reconcile:\n  tickSeconds: 0\n").unwrap_err();
        assert!(err.to_string().contains("tickSeconds"));

        let err = OperatorConfig::from_yaml("conflictRetry:\n  intervalMillis: 0\n").unwrap_err();
        assert!(err.to_string().contains("intervalMillis"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "discoveryServiceAccount: labeler").unwrap();
        let config = OperatorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.discovery_service_account, "labeler");

        assert!(OperatorConfig::load(Some(Path::new("/nonexistent/slurm.yaml"))).is_err());
        assert_eq!(OperatorConfig::load(None).unwrap(), OperatorConfig::default());
    }

    #[test]
    fn password_is_not_logged() {
        let rendered = format!("{:?}", DatabaseCredentials::default());
        assert!(!rendered.contains("password: \"slurm\""));
        assert!(rendered.contains("REDACTED"));
    }
}
