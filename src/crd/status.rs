//! `Network` status types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{GatewayMode, NodeMode};
use crate::rollout::RolloutDecision;

/// Observed rollout state of the cluster network.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatus {
    /// Generation of the spec last reconciled.
    #[serde(default)]
    pub observed_generation: i64,

    /// Sorted internal addresses of the control-plane members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub master_addresses: Vec<String>,

    /// Member seeding the replicated northbound/southbound databases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,

    /// Decision of the last successful pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RolloutDecision>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_mode: Option<NodeMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_mode: Option<GatewayMode>,

    /// Effective IPFIX collectors, including the flows config map target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfix_collectors: Option<String>,

    /// Human-readable message about the last pass.
    /// NOTE: No `skip_serializing_if` so a merge patch clears stale messages.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RolloutCondition>,
}

/// Condition on the `Network` status.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutCondition {
    pub r#type: String,
    pub status: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}
