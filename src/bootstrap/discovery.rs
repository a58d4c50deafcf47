//! Control-plane member discovery with an adaptive deadline.
//!
//! Some topologies never present the expected number of control-plane nodes
//! (single node, assisted installs). Each time discovery runs into its
//! deadline the deadline shrinks, so those clusters stop paying the full wait
//! on every reconcile: 250s, 130s, then 10s from the third pass on.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{ControlPlaneNode, NodeDirectory};
use crate::error::RolloutError;

/// Interval between node listings.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline of the first discovery.
pub const INITIAL_DEADLINE: Duration = Duration::from_secs(250);

/// Amount the deadline shrinks by after each timeout.
pub const DEADLINE_BACKOFF: Duration = Duration::from_secs(120);

/// Smallest deadline ever used for a discovery.
pub const MIN_DEADLINE: Duration = Duration::from_secs(10);

/// Adaptive discovery deadline of one reconciled target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveryDeadline {
    current: Duration,
}

impl Default for DiscoveryDeadline {
    fn default() -> Self {
        Self {
            current: INITIAL_DEADLINE,
        }
    }
}

impl DiscoveryDeadline {
    /// Deadline to use for the next discovery, never below `MIN_DEADLINE`.
    pub fn current(&self) -> Duration {
        self.current.max(MIN_DEADLINE)
    }

    /// Shrink the deadline after a timeout, as long as it stays positive.
    pub fn record_timeout(&mut self) {
        if self.current > DEADLINE_BACKOFF {
            self.current -= DEADLINE_BACKOFF;
        }
    }
}

/// Result of a discovery run.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Members seen by the last successful listing.
    pub nodes: Vec<ControlPlaneNode>,
    /// Whether the deadline passed before the expected count was seen.
    pub timed_out: bool,
}

/// Poll `directory` until `expected` control-plane nodes are listed or
/// `deadline` elapses. The first listing happens immediately.
pub async fn discover(
    directory: &dyn NodeDirectory,
    expected: usize,
    deadline: Duration,
    interval: Duration,
) -> Result<Discovery> {
    let started = Instant::now();
    let mut nodes: Vec<ControlPlaneNode> = Vec::new();

    let polled = tokio::time::timeout(deadline, async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat: u32 = 0;

        loop {
            ticker.tick().await;
            nodes = directory
                .control_plane_nodes()
                .await
                .map_err(|e| RolloutError::NodeDirectory(e.to_string()))?;

            if !nodes.is_empty() && nodes.len() == expected {
                return Ok::<(), RolloutError>(());
            }

            heartbeat += 1;
            if heartbeat % 3 == 0 {
                debug!(
                    "Waiting to complete OVN bootstrap: found ({}) master nodes out of ({}) expected: timing out in {} seconds",
                    nodes.len(),
                    expected,
                    deadline.saturating_sub(started.elapsed()).as_secs()
                );
            }
        }
    })
    .await;

    match polled {
        Ok(Ok(())) => Ok(Discovery {
            nodes,
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            warn!(
                "Timeout exceeded while bootstrapping OVN, expected amount of control plane nodes ({}) do not match found ({}), continuing deployment with found replicas",
                expected,
                nodes.len()
            );
            Ok(Discovery {
                nodes,
                timed_out: true,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Node directory returning a scripted sequence of listings.
    /// The last listing repeats once the script is exhausted.
    pub struct ScriptedDirectory {
        listings: Mutex<Vec<Result<Vec<ControlPlaneNode>, String>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedDirectory {
        pub fn new(listings: Vec<Vec<ControlPlaneNode>>) -> Self {
            Self {
                listings: Mutex::new(listings.into_iter().map(Ok).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                listings: Mutex::new(vec![Err(message.to_string())]),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeDirectory for ScriptedDirectory {
        async fn control_plane_nodes(&self) -> Result<Vec<ControlPlaneNode>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut listings = self.listings.lock().unwrap();
            let next = if listings.len() > 1 {
                listings.remove(0)
            } else {
                listings[0].clone()
            };
            next.map_err(|e| anyhow::anyhow!(e))
        }
    }

    pub fn node(name: &str, address: &str) -> ControlPlaneNode {
        ControlPlaneNode {
            name: name.to_string(),
            internal_address: Some(address.to_string()),
        }
    }
}
