//! Image pre-pull staging ahead of node tier updates.
//!
//! Before the node tier moves to a new release, a no-op DaemonSet using the
//! new image is rolled out to every node. Once it has finished (or is hung
//! close enough to completion) the node update proceeds.

use tracing::{debug, info};

use super::progress::is_progressing;
use super::tier::TierState;

/// Outcome of the pre-pull staging check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepullStage {
    pub permit_node_update: bool,
    pub render_prepull: bool,
}

impl PrepullStage {
    const PROCEED: Self = Self {
        permit_node_update: true,
        render_prepull: false,
    };
    const HOLD: Self = Self {
        permit_node_update: false,
        render_prepull: true,
    };
}

/// Decide whether the node tier may move to `release` yet.
pub fn stage(node: Option<&TierState>, prepuller: Option<&TierState>, release: &str) -> PrepullStage {
    let Some(node) = node else {
        debug!("Fresh cluster, no need for prepuller");
        return PrepullStage::PROCEED;
    };

    if node.is_at_version(release) {
        debug!("OVN-Kubernetes node is already in the expected release.");
        return PrepullStage::PROCEED;
    }

    let Some(prepuller) = prepuller else {
        info!("Rolling out the no-op prepuller daemonset...");
        return PrepullStage::HOLD;
    };

    // A prepuller left over from an earlier target has to pull the new image.
    if !prepuller.is_at_version(release) {
        info!("Rendering prepuller daemonset to update its image...");
        return PrepullStage::HOLD;
    }

    if is_progressing(prepuller, true) {
        info!(
            "Waiting for {} daemonset to finish pulling the image before updating node",
            prepuller.name
        );
        return PrepullStage::HOLD;
    }

    info!("{} daemonset rollout complete, now starting node rollouts", prepuller.name);
    PrepullStage::PROCEED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::tier::fixtures::{rolling, settled};

    #[test]
    fn test_fresh_cluster_needs_no_prepull() {
        let got = stage(None, None, "4.11.0");
        assert!(got.permit_node_update);
        assert!(!got.render_prepull);
    }

    #[test]
    fn test_node_at_release_needs_no_prepull() {
        let node = settled("ovnkube-node", "4.11.0");
        assert_eq!(stage(Some(&node), None, "4.11.0"), PrepullStage::PROCEED);
    }

    #[test]
    fn test_missing_prepuller_is_rendered_first() {
        let node = settled("ovnkube-node", "4.10.0");
        let got = stage(Some(&node), None, "4.11.0");
        assert!(!got.permit_node_update);
        assert!(got.render_prepull);
    }

    #[test]
    fn test_stale_prepuller_is_rerendered() {
        let node = settled("ovnkube-node", "4.10.0");
        let prepuller = settled("ovnkube-upgrades-prepuller", "4.12.0");
        assert_eq!(
            stage(Some(&node), Some(&prepuller), "4.11.0"),
            PrepullStage::HOLD
        );
    }

    #[test]
    fn test_rolling_prepuller_holds_node() {
        let node = settled("ovnkube-node", "4.10.0");
        let prepuller = rolling("ovnkube-upgrades-prepuller", "4.11.0");
        assert_eq!(
            stage(Some(&node), Some(&prepuller), "4.11.0"),
            PrepullStage::HOLD
        );
    }

    #[test]
    fn test_hung_prepuller_near_completion_releases_node() {
        let node = settled("ovnkube-node", "4.10.0");
        let mut prepuller = rolling("ovnkube-upgrades-prepuller", "4.11.0");
        prepuller.progress.updated = 2;
        prepuller.hung = true;
        assert_eq!(
            stage(Some(&node), Some(&prepuller), "4.11.0"),
            PrepullStage::PROCEED
        );
    }

    #[test]
    fn test_finished_prepuller_releases_node() {
        let node = settled("ovnkube-node", "4.10.0");
        let prepuller = settled("ovnkube-upgrades-prepuller", "4.11.0");
        assert_eq!(
            stage(Some(&node), Some(&prepuller), "4.11.0"),
            PrepullStage::PROCEED
        );
    }
}
