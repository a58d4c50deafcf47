//! Version-skew ordering between the master and node tiers.
//!
//! On upgrade the node tier moves first and the master follows once the nodes
//! have rolled out. On downgrade the order is reversed.
//!
//! ```text
//! +-------------+---------------+-----------------+------------------+
//! |    Delta    |  master upg.  |    master OK    |   master downg.  |
//! +-------------+---------------+-----------------+------------------+
//! | node upg.   | upgrade node  | inconsistent    | inconsistent     |
//! | node OK     | wait for node | done            | inconsistent     |
//! | node downg. | inconsistent  | wait for master | downgrade master |
//! +-------------+---------------+-----------------+------------------+
//! ```

use tracing::{debug, warn};

use super::progress::is_progressing;
use super::tier::TierState;
use super::version::{VersionDelta, classify};

/// Per-tier update permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierUpdate {
    pub node: bool,
    pub master: bool,
}

impl TierUpdate {
    pub const BOTH: Self = Self {
        node: true,
        master: true,
    };
    pub const NODE_ONLY: Self = Self {
        node: true,
        master: false,
    };
    pub const MASTER_ONLY: Self = Self {
        node: false,
        master: true,
    };
}

/// Decide which tiers may be updated towards `release`.
pub fn sequence(node: Option<&TierState>, master: Option<&TierState>, release: &str) -> TierUpdate {
    // Fresh cluster - full steam ahead!
    let (Some(node), Some(master)) = (node, master) else {
        return TierUpdate::BOTH;
    };

    let node_version = node.version.as_deref().unwrap_or_default();
    let master_version = master.version.as_deref().unwrap_or_default();

    if node_version == release && master_version == release {
        debug!(
            "OVN-Kubernetes master and node already at release version {}; no changes required",
            release
        );
        return TierUpdate::BOTH;
    }

    let node_delta = classify(node_version, release);
    let master_delta = classify(master_version, release);

    if node_delta == VersionDelta::Unknown || master_delta == VersionDelta::Unknown {
        warn!(
            "could not determine ovn-kubernetes daemonset update directions; node: {}, master: {}, release: {}",
            node_version, master_version, release
        );
        return TierUpdate::BOTH;
    }

    debug!(
        "OVN-Kubernetes master version {} -> latest {}; delta {}",
        master_version, release, master_delta
    );
    debug!(
        "OVN-Kubernetes node version {} -> latest {}; delta {}",
        node_version, release, node_delta
    );

    resolve(node_delta, master_delta, node, master)
}

/// Apply the ordering table to a pair of known deltas.
fn resolve(
    node_delta: VersionDelta,
    master_delta: VersionDelta,
    node: &TierState,
    master: &TierState,
) -> TierUpdate {
    use VersionDelta::{Downgrade, Same, Upgrade};

    match (node_delta, master_delta) {
        (Upgrade, Upgrade) => {
            debug!("Upgrading OVN-Kubernetes node before master");
            TierUpdate::NODE_ONLY
        }
        (Same, Upgrade) => {
            if is_progressing(node, true) {
                debug!("Waiting for OVN-Kubernetes node update to roll out before updating master");
                TierUpdate::NODE_ONLY
            } else {
                debug!("OVN-Kubernetes node update rolled out; now updating master");
                TierUpdate::BOTH
            }
        }
        (Downgrade, Downgrade) => {
            debug!("Downgrading OVN-Kubernetes master before node");
            TierUpdate::MASTER_ONLY
        }
        (Downgrade, Same) => {
            if is_progressing(master, false) {
                debug!(
                    "Waiting for OVN-Kubernetes master downgrade to roll out before downgrading node"
                );
                TierUpdate::MASTER_ONLY
            } else {
                debug!("OVN-Kubernetes master update rolled out; now downgrading node");
                TierUpdate::BOTH
            }
        }
        (Same, Same) => TierUpdate::BOTH,
        (node_delta, master_delta) => {
            warn!(
                "OVN-Kubernetes daemonset versions inconsistent; node delta: {}, master delta: {}",
                node_delta, master_delta
            );
            TierUpdate::BOTH
        }
    }
}
