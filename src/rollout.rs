//! Rollout decision engine.
//!
//! Combines the IP family gate, the version sequencer and the pre-pull stager
//! into one decision per reconcile pass. Everything here is a pure function
//! of the snapshot taken at bootstrap.

pub mod ipfamily;
pub mod prepull;
pub mod progress;
pub mod sequencer;
pub mod tier;
pub mod version;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use ipfamily::FamilyGate;
pub use tier::{ExistingTiers, IpFamilyMode, ProgressStatus, TierState};

/// Which rendered tier objects may be applied this pass.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutDecision {
    pub update_master: bool,
    pub update_node: bool,
    pub render_prepull: bool,
}

/// Decide the rollout for `release` with the given desired family mode.
pub fn decide(tiers: &ExistingTiers, family: IpFamilyMode, release: &str) -> RolloutDecision {
    let node = tiers.node.as_ref();
    let master = tiers.master.as_ref();

    // A master family conversion in flight holds version sequencing back.
    let update = match ipfamily::gate(node, master, family) {
        FamilyGate::Migrating(update) => update,
        FamilyGate::PassThrough => sequencer::sequence(node, master, release),
    };

    let (update_node, render_prepull) = if update.node {
        let staged = prepull::stage(node, tiers.prepuller.as_ref(), release);
        (staged.permit_node_update, staged.render_prepull)
    } else {
        (false, false)
    };

    let decision = RolloutDecision {
        update_master: update.master,
        update_node,
        render_prepull,
    };
    info!(
        "Rollout decision for release {} ({}): master={}, node={}, prepull={}",
        release, family, decision.update_master, decision.update_node, decision.render_prepull
    );
    decision
}
