//! Status patch helpers, condition builders, and event recording.

use anyhow::Result;
use chrono::Utc;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Api;
use kube::Resource;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::debug;

use crate::bootstrap::ClusterSnapshot;
use crate::crd::{Network, NetworkSpec, RolloutCondition, RolloutStatus};
use crate::names::FIELD_MANAGER;
use crate::rollout::RolloutDecision;

pub const CONDITION_BOOTSTRAPPED: &str = "Bootstrapped";
pub const CONDITION_CONFIG_VALID: &str = "ConfigValid";
pub const CONDITION_READY: &str = "Ready";

/// Patch the status subresource of a `Network`.
pub async fn patch_status(api: &Api<Network>, name: &str, status: &RolloutStatus) -> Result<Network> {
    debug!(
        "Patching status for {}: decision={:?}",
        name, status.decision
    );

    let patch = serde_json::json!({ "status": status });
    let result = api
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(result)
}

/// Set a condition on the status. The transition time only moves when the
/// condition status changes.
pub fn set_condition(
    status: &mut RolloutStatus,
    condition_type: &str,
    condition_status: &str,
    reason: &str,
    message: Option<String>,
) {
    let last_transition_time = status
        .conditions
        .iter()
        .find(|c| c.r#type == condition_type && c.status == condition_status)
        .map_or_else(Utc::now, |c| c.last_transition_time);

    status.conditions.retain(|c| c.r#type != condition_type);
    status.conditions.push(RolloutCondition {
        r#type: condition_type.to_string(),
        status: condition_status.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time,
    });
}

/// Record bootstrap facts.
pub fn set_bootstrapped(status: &mut RolloutStatus, snapshot: &ClusterSnapshot, spec: &NetworkSpec) {
    status.master_addresses.clone_from(&snapshot.master_addresses);
    status.initiator = Some(snapshot.initiator.clone());
    status.node_mode = Some(snapshot.node_mode);
    status.gateway_mode = Some(snapshot.gateway_mode);
    status.ipfix_collectors = snapshot.ipfix_collectors(spec);

    let (reason, message) = if snapshot.discovery_timed_out {
        (
            "PartialMembership",
            format!(
                "found {} of {} expected control plane nodes",
                snapshot.master_addresses.len(),
                snapshot.expected_replicas
            ),
        )
    } else {
        (
            "MembershipComplete",
            format!("{} control plane nodes", snapshot.master_addresses.len()),
        )
    };
    set_condition(status, CONDITION_BOOTSTRAPPED, "True", reason, Some(message));
}

/// Record a successful pass.
pub fn set_rolled_out(status: &mut RolloutStatus, decision: RolloutDecision, applied: usize) {
    status.decision = Some(decision);
    status.last_reconciled_at = Some(Utc::now());
    status.message = None;
    set_condition(status, CONDITION_CONFIG_VALID, "True", "Valid", None);

    let held: Vec<&str> = [
        ("master", decision.update_master),
        ("node", decision.update_node),
    ]
    .into_iter()
    .filter_map(|(tier, update)| (!update).then_some(tier))
    .collect();
    if held.is_empty() {
        set_condition(
            status,
            CONDITION_READY,
            "True",
            "Applied",
            Some(format!("applied {applied} objects")),
        );
    } else {
        set_condition(
            status,
            CONDITION_READY,
            "False",
            "RolloutInProgress",
            Some(format!("holding back {}", held.join(", "))),
        );
    }
}

/// Record a configuration rejected by validation or change-safety checks.
pub fn set_invalid(status: &mut RolloutStatus, errors: &[String]) {
    let message = errors.join("; ");
    status.message = Some(message.clone());
    set_condition(status, CONDITION_CONFIG_VALID, "False", "InvalidConfig", Some(message.clone()));
    set_condition(status, CONDITION_READY, "False", "InvalidConfig", Some(message));
}

/// Record a failed pass.
pub fn set_failed(status: &mut RolloutStatus, reason: &str, message: impl Into<String>) {
    let message = message.into();
    status.message = Some(message.clone());
    set_condition(status, CONDITION_READY, "False", reason, Some(message));
}

/// Event recorder bundled with its target `ObjectReference`.
pub struct EventRecorder {
    recorder: Recorder,
    obj_ref: ObjectReference,
}

impl EventRecorder {
    /// Create an event recorder for the given `Network` resource.
    pub fn new(client: kube::Client, obj: &Network) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
            obj_ref: obj.object_ref(&()),
        }
    }

    async fn emit(&self, type_: EventType, reason: &str, message: &str) {
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note: Some(message.into()),
                    action: reason.into(),
                    secondary: None,
                },
                &self.obj_ref,
            )
            .await
            .unwrap_or_else(|e| tracing::warn!("Failed to publish event: {}", e));
    }

    /// Publish a Normal event.
    pub async fn publish(&self, reason: &str, message: &str) {
        self.emit(EventType::Normal, reason, message).await;
    }

    /// Publish a Warning event.
    pub async fn publish_warning(&self, reason: &str, message: &str) {
        self.emit(EventType::Warning, reason, message).await;
    }
}
