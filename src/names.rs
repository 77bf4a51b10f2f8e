//! Derived resource naming
//!
//! Every object the operator creates for a cluster is named from the cluster
//! name, the component and (for compute nodes) the node name. Nothing random
//! or counter-based goes into a name, so create, exists and delete all agree
//! on which object they mean.

/// Label marking objects owned by the operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY: &str = "slurm-operator";

/// Label carrying the owning cluster's name
pub const CLUSTER_LABEL: &str = "slurm.hpc.dev/cluster";

/// Field manager used for every write
pub const FIELD_MANAGER: &str = "slurm-operator";

/// Named components of a cluster's derived resource set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Target namespace
    Namespace,
    /// Node capability discovery DaemonSet
    Discovery,
    /// Munge key artifact
    MungeKey,
    /// slurm.conf artifact
    SlurmConf,
    /// slurmdbd.conf artifact
    SlurmdbdConf,
    /// MariaDB server override artifact
    MariaDbConfig,
    /// MariaDB init script artifact
    MariaDbInit,
    /// slurmctld control plane
    Slurmctld,
    /// Per-node slurmd compute daemon
    Slurmd,
    /// Diagnostics and shell access
    Toolbox,
    /// MariaDB accounting database
    MariaDb,
    /// slurmdbd accounting daemon
    Slurmdbd,
    /// slurmrestd REST gateway
    Slurmrestd,
}

impl Component {
    /// Name suffix appended to the cluster name
    ///
    /// Compute nodes use the node name instead, see [`compute`].
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Namespace => "",
            Self::Discovery => "slurmabler",
            Self::MungeKey => "munged",
            Self::SlurmConf => "slurm",
            Self::SlurmdbdConf => "slurmdbd",
            Self::MariaDbConfig => "mariadb-config",
            Self::MariaDbInit => "mariadb-init",
            Self::Slurmctld => "slurmctld",
            Self::Slurmd => "slurmd",
            Self::Toolbox => "slurm-toolbox",
            Self::MariaDb => "mariadb",
            Self::Slurmdbd => "slurmdbd",
            Self::Slurmrestd => "slurmrestd",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace => write!(f, "namespace"),
            other => write!(f, "{}", other.suffix()),
        }
    }
}

/// `<cluster>-<suffix>` for a singleton component
pub fn resource(cluster: &str, component: Component) -> String {
    format!("{cluster}-{}", component.suffix())
}

/// `<cluster>-<node>` for a compute node's workload, service and hostname
pub fn compute(cluster: &str, node: &str) -> String {
    format!("{cluster}-{node}")
}

/// `app` label value shared by all compute pods of a cluster
pub fn compute_app(cluster: &str) -> String {
    resource(cluster, Component::Slurmd)
}

/// Label selector matching every compute Deployment and Service of a cluster
pub fn compute_selector(cluster: &str) -> String {
    format!("{CLUSTER_LABEL}={cluster},app={}", compute_app(cluster))
}
