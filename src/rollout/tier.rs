//! Observed state of the datapath tiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Service addressing mode of the cluster.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum IpFamilyMode {
    SingleStack,
    DualStack,
}

impl IpFamilyMode {
    /// Derive the mode from the number of configured service address pools.
    pub const fn from_service_pools(count: usize) -> Self {
        if count == 2 {
            Self::DualStack
        } else {
            Self::SingleStack
        }
    }

    /// Value of the family marker annotation.
    pub const fn as_marker(self) -> &'static str {
        match self {
            Self::SingleStack => "single-stack",
            Self::DualStack => "dual-stack",
        }
    }

    /// Parse a family marker annotation. Unrecognized markers yield `None`.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "single-stack" => Some(Self::SingleStack),
            "dual-stack" => Some(Self::DualStack),
            _ => None,
        }
    }
}

impl std::fmt::Display for IpFamilyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_marker())
    }
}

/// Rollout counters of a tier workload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressStatus {
    pub desired: i64,
    pub updated: i64,
    pub available: i64,
    pub unavailable: i64,
    pub generation: i64,
    pub observed_generation: i64,
}

/// Read-only snapshot of one deployed tier.
#[derive(Clone, Debug, Default)]
pub struct TierState {
    pub namespace: String,
    pub name: String,
    /// Deployed release version marker, if any.
    pub version: Option<String>,
    /// Persisted family mode marker, if any.
    pub family_mode: Option<IpFamilyMode>,
    /// Whether the rollout has been marked as hung.
    pub hung: bool,
    pub progress: ProgressStatus,
}

impl TierState {
    /// Returns true if the tier already carries the given release version.
    pub fn is_at_version(&self, release: &str) -> bool {
        self.version.as_deref() == Some(release)
    }
}

/// Tiers found in the cluster at bootstrap time. `None` means absent.
#[derive(Clone, Debug, Default)]
pub struct ExistingTiers {
    pub master: Option<TierState>,
    pub node: Option<TierState>,
    pub prepuller: Option<TierState>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A fully rolled out tier at the given version.
    pub fn settled(name: &str, version: &str) -> TierState {
        TierState {
            namespace: "openshift-ovn-kubernetes".to_string(),
            name: name.to_string(),
            version: Some(version.to_string()),
            family_mode: Some(IpFamilyMode::SingleStack),
            hung: false,
            progress: ProgressStatus {
                desired: 3,
                updated: 3,
                available: 3,
                unavailable: 0,
                generation: 2,
                observed_generation: 2,
            },
        }
    }

    /// A tier still rolling out at the given version.
    pub fn rolling(name: &str, version: &str) -> TierState {
        let mut tier = settled(name, version);
        tier.progress.updated = 1;
        tier.progress.unavailable = 1;
        tier
    }
}
