//! Rollout progress evaluation for tier workloads.

use tracing::{debug, warn};

use super::tier::TierState;

/// Fraction of replicas that may lag behind a hung rollout.
const HUNG_TOLERANCE: f64 = 0.1;

/// Returns true if the tier is still rolling out a change.
///
/// With `allow_hung`, a rollout marked as hung is treated as complete when no
/// more than `max(1, floor(desired * 0.1))` replicas are behind.
pub fn is_progressing(tier: &TierState, allow_hung: bool) -> bool {
    let p = &tier.progress;

    let progressing = p.updated < p.desired
        || p.unavailable > 0
        || p.available == 0
        || p.generation > p.observed_generation;

    debug!(
        "daemonset {}/{} rollout {}; {}/{} scheduled; {} unavailable; {} available; generation {} -> {}",
        tier.namespace,
        tier.name,
        if progressing { "progressing" } else { "complete" },
        p.updated,
        p.desired,
        p.unavailable,
        p.available,
        p.generation,
        p.observed_generation
    );

    if !progressing {
        return false;
    }

    if allow_hung && tier.hung {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let max_behind = ((p.desired as f64 * HUNG_TOLERANCE).floor() as i64).max(1);
        let behind = p.desired - p.updated;
        if behind <= max_behind {
            warn!(
                "daemonset {}/{} rollout seems to have hung with {}/{} behind, force-continuing",
                tier.namespace, tier.name, behind, p.desired
            );
            return false;
        }
    }

    true
}
