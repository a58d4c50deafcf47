//! Single-stack / dual-stack conversion gate.
//!
//! A family mode change is rolled out to the master tier first, then to the
//! node tier once the master has settled. While the master is being converted
//! the gate takes precedence over version sequencing; once it has settled,
//! version sequencing decides the node conversion step too.

use tracing::debug;

use super::progress::is_progressing;
use super::sequencer::TierUpdate;
use super::tier::{IpFamilyMode, TierState};

/// Result of the family mode check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FamilyGate {
    /// Version sequencing decides: no conversion in flight, or only the node
    /// tier is left to convert.
    PassThrough,
    /// A conversion is in flight and dictates the tier updates.
    Migrating(TierUpdate),
}

/// Inspect the family markers of the deployed tiers against `desired`.
pub fn gate(node: Option<&TierState>, master: Option<&TierState>, desired: IpFamilyMode) -> FamilyGate {
    // Fresh cluster, or tiers deployed before markers existed: markers get written.
    let (Some(node), Some(master)) = (node, master) else {
        return FamilyGate::PassThrough;
    };
    let (Some(node_mode), Some(master_mode)) = (node.family_mode, master.family_mode) else {
        return FamilyGate::PassThrough;
    };

    if node_mode == desired && master_mode == desired {
        return FamilyGate::PassThrough;
    }

    if master_mode != desired {
        debug!(
            "IP family mode change detected to {}, updating OVN-Kubernetes master",
            desired
        );
        return FamilyGate::Migrating(TierUpdate::MASTER_ONLY);
    }

    if is_progressing(master, false) {
        debug!(
            "Waiting for OVN-Kubernetes master daemonset IP family mode rollout before updating node"
        );
        return FamilyGate::Migrating(TierUpdate::MASTER_ONLY);
    }

    debug!("OVN-Kubernetes master daemonset rollout complete, updating IP family mode on node daemonset");
    FamilyGate::PassThrough
}
