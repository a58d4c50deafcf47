//! Custom error types for cnro.

use thiserror::Error;

/// Errors that abort a reconciliation pass.
#[derive(Error, Debug)]
pub enum RolloutError {
    #[error("Unable to bootstrap OVN, unable to retrieve cluster config: {0}")]
    ClusterConfig(String),

    #[error("Unable to bootstrap OVN, unable to unmarshal install-config: {0}")]
    InstallConfig(String),

    #[error("Unable to bootstrap OVN, control plane node listing failed: {0}")]
    NodeDirectory(String),

    #[error("No InternalIP found on master node '{0}'")]
    NoInternalAddress(String),

    #[error("No control plane nodes discovered, cannot elect a cluster initiator")]
    NoControlPlaneMembers,

    #[error("Unable to render OVN in a cluster with an external control plane: no control plane to target")]
    ExternalControlPlane,

    #[error("Invalid network configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Kubernetes API error: {0}")]
    KubernetesApi(String),
}

impl RolloutError {
    /// Returns true if this error is transient and should be retried soon.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ClusterConfig(_) | Self::NodeDirectory(_) | Self::KubernetesApi(_)
        )
    }
}
