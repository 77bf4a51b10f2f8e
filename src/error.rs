//! Error types for the Slurm operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for cluster specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration artifact rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A readiness gate ran out of attempts under a fail policy
    #[error("timed out waiting for {what} after {attempts} attempts")]
    ConvergenceTimeout {
        /// What was being waited on
        what: String,
        /// Number of polls performed
        attempts: u32,
    },

    /// A node vanished while its labels were being updated
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Random number generation or key material error
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a crypto error with the given message
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Self::Kube(kube::Error::Api(ae)) => Some(ae.code),
            _ => None,
        }
    }

    fn api_reason(&self) -> Option<&str> {
        match self {
            Self::Kube(kube::Error::Api(ae)) => Some(ae.reason.as_str()),
            _ => None,
        }
    }

    /// The object does not exist (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// An optimistic-concurrency conflict on update (HTTP 409, reason Conflict)
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() != Some("AlreadyExists")
    }

    /// A create collided with an existing object (HTTP 409, reason AlreadyExists)
    pub fn is_already_exists(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() == Some("AlreadyExists")
    }

    /// Errors worth retrying without a spec change.
    ///
    /// Conflicts, throttling, server-side failures and transport errors are
    /// transient. Rejections such as 400/403/422 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(ae)) => {
                matches!(ae.code, 409 | 429 | 500 | 502 | 503 | 504)
            }
            Self::Kube(_) => true,
            Self::ConvergenceTimeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} ({code})"),
        reason: reason.to_string(),
        code,
    }))
}
