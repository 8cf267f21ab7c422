//! Error types for berth-kube

use berth_core::ChartError;
use thiserror::Error;

/// Result type for cluster and release-service operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised by the cluster or the release service
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be parsed or turned into a client config
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// The release service cannot be reached
    #[error("release service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("release '{name}' not found")]
    ReleaseNotFound { name: String },

    #[error("release '{name}' already exists in namespace '{namespace}'")]
    ReleaseAlreadyExists { name: String, namespace: String },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// One or more resources failed to apply
    #[error("apply failed: {0}")]
    ApplyFailed(String),

    #[error("timed out after {0}")]
    Timeout(String),
}

/// Failures while turning a credential reference into an open cluster session
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("cannot find kubeconfig credentials with id '{id}'")]
    CredentialNotFound { id: String },

    /// The credential store itself could not be read
    #[error("credential store error: {0}")]
    Store(String),

    #[error("failed to create cluster client: {0}")]
    Client(#[source] KubeError),

    #[error("failed to open tunnel to the release service: {0}")]
    Tunnel(#[source] KubeError),

    #[error("failed to create release manager: {0}")]
    Manager(#[source] KubeError),

    #[error("failed to query release: {0}")]
    Query(#[source] KubeError),
}

/// Terminal failure of one reconciliation
///
/// Service errors, interruptions and execution faults during install or
/// update all collapse into [`ReconcileError::Install`] /
/// [`ReconcileError::Update`]; the message keeps the distinction for logs.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("cannot find kubeconfig credentials with id '{id}'")]
    CredentialNotFound { id: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to install release '{name}': {message}")]
    Install { name: String, message: String },

    #[error("failed to update release '{name}': {message}")]
    Update { name: String, message: String },
}

impl From<ConnectionError> for ReconcileError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::CredentialNotFound { id } => Self::CredentialNotFound { id },
            other => Self::Connection(other.to_string()),
        }
    }
}
