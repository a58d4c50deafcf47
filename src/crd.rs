//! `Network` CRD type definition.

pub mod spec;
pub mod status;
pub mod types;

pub use spec::{HybridOverlayConfig, Network, NetworkSpec, OvnKubernetesConfig, PolicyAuditConfig};
pub use status::{RolloutCondition, RolloutStatus};
pub use types::{ControlPlaneTopology, GatewayMode, NodeMode};
