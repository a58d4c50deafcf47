//! Enum types for bootstrap facts reported in status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the node tier runs on each host.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum NodeMode {
    #[default]
    Full,
    Dpu,
    DpuHost,
}

impl NodeMode {
    /// Parse an override value. Only the DPU modes can be requested.
    pub fn from_override(value: &str) -> Option<Self> {
        match value {
            "dpu" => Some(Self::Dpu),
            "dpu-host" => Some(Self::DpuHost),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Dpu => write!(f, "dpu"),
            Self::DpuHost => write!(f, "dpu-host"),
        }
    }
}

/// Egress gateway mode of the node tier.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum GatewayMode {
    #[default]
    Shared,
    Local,
}

impl GatewayMode {
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "shared" => Some(Self::Shared),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Where the cluster control plane runs.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ControlPlaneTopology {
    #[default]
    HighlyAvailable,
    SingleReplica,
    External,
}

impl ControlPlaneTopology {
    /// Parse `status.controlPlaneTopology`; unset means highly available.
    pub fn from_status(value: Option<&str>) -> Self {
        match value {
            Some("External") => Self::External,
            Some("SingleReplica") => Self::SingleReplica,
            _ => Self::HighlyAvailable,
        }
    }
}
