//! Cluster bootstrap: control-plane membership, initiator election and the
//! auxiliary facts the rollout pass needs.
//!
//! Bootstrap is the only step of a pass that waits on the cluster. Everything
//! it returns is an immutable snapshot consumed by the pure decision logic in
//! [`crate::rollout`].

pub mod discovery;
pub mod flows;
pub mod initiator;
pub mod install_config;
pub mod ovn_config;

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use discovery::DiscoveryDeadline;
pub use flows::FlowsConfig;

use crate::crd::{ControlPlaneTopology, GatewayMode, NetworkSpec, NodeMode};
use crate::error::RolloutError;
use crate::names::{
    CLUSTER_CONFIG_NAME, CLUSTER_CONFIG_NAMESPACE, DPU_MODE_CONFIG, FLOWS_CONFIG,
    GATEWAY_MODE_CONFIG, INSTALL_CONFIG_KEY, MASTER_DAEMONSET, NODE_DAEMONSET,
    PREPULLER_DAEMONSET,
};
use crate::rollout::{ExistingTiers, TierState};
use crate::state::StateStore;

/// A node carrying the control-plane role label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneNode {
    pub name: String,
    /// First `InternalIP` address reported by the node.
    pub internal_address: Option<String>,
}

/// Cluster infrastructure facts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfraStatus {
    pub topology: ControlPlaneTopology,
    pub platform_type: String,
}

/// Lists control-plane nodes.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn control_plane_nodes(&self) -> Result<Vec<ControlPlaneNode>>;
}

/// Read access to the cluster objects bootstrap depends on.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Data of a config map, `None` when it does not exist.
    async fn config_map(&self, namespace: &str, name: &str)
    -> Result<Option<BTreeMap<String, String>>>;

    /// State of a tier DaemonSet, `None` when it does not exist.
    async fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<TierState>>;

    async fn infrastructure(&self) -> Result<InfraStatus>;
}

/// Result of bootstrapping one reconciled target.
#[derive(Clone, Debug, Default)]
pub struct ClusterSnapshot {
    /// Internal addresses of the control-plane members, sorted ascending.
    pub master_addresses: Vec<String>,
    pub initiator: String,
    pub expected_replicas: usize,
    /// Whether discovery ran into its deadline.
    pub discovery_timed_out: bool,
    pub topology: ControlPlaneTopology,
    pub platform_type: String,
    pub node_mode: NodeMode,
    pub gateway_mode: GatewayMode,
    pub flows: Option<FlowsConfig>,
    pub tiers: ExistingTiers,
}

impl ClusterSnapshot {
    /// Database endpoints for every member, e.g. `ssl:10.0.0.1:9641,ssl:...`.
    pub fn db_list(&self, port: u16) -> String {
        self.master_addresses
            .iter()
            .map(|addr| format!("ssl:{}", join_host_port(addr, port)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Listen suffix enabling IPv6 listeners when the members are IPv6.
    pub fn listen_dual_stack(&self) -> &'static str {
        match self.master_addresses.first() {
            Some(addr) if addr.parse::<Ipv6Addr>().is_ok() => ":[::]",
            _ => "",
        }
    }

    /// Smallest number of members that still forms a raft quorum.
    pub const fn min_available(&self) -> usize {
        self.master_addresses.len() / 2 + 1
    }

    pub const fn is_single_node(&self) -> bool {
        self.master_addresses.len() == 1
    }

    /// Effective IPFIX collectors: spec collectors plus the flows config map
    /// target.
    pub fn ipfix_collectors(&self, spec: &NetworkSpec) -> Option<String> {
        let declared = spec.ipfix_collectors();
        let merged = match &self.flows {
            Some(flows) => flows.merge_collectors(Some(&declared)),
            None => declared,
        };
        (!merged.is_empty()).then_some(merged)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Bootstraps targets and owns the adaptive discovery deadline of each.
pub struct Bootstrapper {
    datapath_namespace: String,
    operator_namespace: String,
    poll_interval: Duration,
    deadlines: Mutex<HashMap<String, DiscoveryDeadline>>,
}

impl Bootstrapper {
    pub fn new(datapath_namespace: impl Into<String>, operator_namespace: impl Into<String>) -> Self {
        Self {
            datapath_namespace: datapath_namespace.into(),
            operator_namespace: operator_namespace.into(),
            poll_interval: discovery::POLL_INTERVAL,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// Discovery deadline the next bootstrap of `target` will use.
    pub fn deadline_for(&self, target: &str) -> Duration {
        self.deadlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .copied()
            .unwrap_or_default()
            .current()
    }

    fn record_timeout(&self, target: &str) -> Duration {
        let mut deadlines = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = deadlines.entry(target.to_string()).or_default();
        deadline.record_timeout();
        deadline.current()
    }

    /// Bootstrap `target`, producing the snapshot a rollout pass decides on.
    pub async fn bootstrap(
        &self,
        target: &str,
        spec: &NetworkSpec,
        cluster: &dyn ClusterReader,
        directory: &dyn NodeDirectory,
        store: &dyn StateStore,
    ) -> Result<ClusterSnapshot> {
        let infra = cluster
            .infrastructure()
            .await
            .map_err(|e| RolloutError::KubernetesApi(format!("reading infrastructure: {e}")))?;
        if infra.topology == ControlPlaneTopology::External {
            return Err(RolloutError::ExternalControlPlane.into());
        }

        let expected = self.expected_replicas(cluster).await?;

        let deadline = self.deadline_for(target);
        debug!(
            "Discovering control plane members for {}: expecting {}, deadline {}s",
            target,
            expected,
            deadline.as_secs()
        );
        let found = discovery::discover(directory, expected, deadline, self.poll_interval).await?;
        if found.timed_out {
            let next = self.record_timeout(target);
            info!("Shrunk discovery deadline for {} to {}s", target, next.as_secs());
        }

        let mut master_addresses = found
            .nodes
            .iter()
            .map(|node| {
                node.internal_address
                    .clone()
                    .ok_or_else(|| RolloutError::NoInternalAddress(node.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        master_addresses.sort();

        let initiator = initiator::elect(store, &master_addresses)
            .await?
            .ok_or(RolloutError::NoControlPlaneMembers)?;

        let node_mode = ovn_config::node_mode(
            cluster
                .config_map(&self.operator_namespace, DPU_MODE_CONFIG)
                .await
                .map_err(|e| {
                    RolloutError::KubernetesApi(format!("could not determine node mode: {e}"))
                })?
                .as_ref(),
        );

        let gateway_mode = match spec.ovn().and_then(|ovn| ovn.gateway_config.as_ref()) {
            Some(gw) if gw.routing_via_host => GatewayMode::Local,
            Some(_) => GatewayMode::Shared,
            None => ovn_config::gateway_mode(
                cluster
                    .config_map(&self.operator_namespace, GATEWAY_MODE_CONFIG)
                    .await,
            ),
        };

        let flows = match cluster.config_map(&self.operator_namespace, FLOWS_CONFIG).await {
            Ok(Some(data)) => FlowsConfig::from_data(&data),
            Ok(None) => None,
            Err(e) => {
                warn!("Error fetching {} config map, ignoring: {}", FLOWS_CONFIG, e);
                None
            }
        };

        let tiers = ExistingTiers {
            master: self.read_tier(cluster, MASTER_DAEMONSET).await?,
            node: self.read_tier(cluster, NODE_DAEMONSET).await?,
            prepuller: self.read_tier(cluster, PREPULLER_DAEMONSET).await?,
        };

        info!(
            "Bootstrapped OVN cluster: members {:?}, initiator {}, node mode {}, gateway mode {}",
            master_addresses, initiator, node_mode, gateway_mode
        );

        Ok(ClusterSnapshot {
            master_addresses,
            initiator,
            expected_replicas: expected,
            discovery_timed_out: found.timed_out,
            topology: infra.topology,
            platform_type: infra.platform_type,
            node_mode,
            gateway_mode,
            flows,
            tiers,
        })
    }

    async fn expected_replicas(&self, cluster: &dyn ClusterReader) -> Result<usize> {
        let data = cluster
            .config_map(CLUSTER_CONFIG_NAMESPACE, CLUSTER_CONFIG_NAME)
            .await
            .map_err(|e| RolloutError::ClusterConfig(e.to_string()))?
            .ok_or_else(|| {
                RolloutError::ClusterConfig(format!(
                    "{CLUSTER_CONFIG_NAMESPACE}/{CLUSTER_CONFIG_NAME} not found"
                ))
            })?;
        let Some(document) = data.get(INSTALL_CONFIG_KEY) else {
            warn!(
                "{}/{} has no {} key, assuming 0 control plane replicas",
                CLUSTER_CONFIG_NAMESPACE, CLUSTER_CONFIG_NAME, INSTALL_CONFIG_KEY
            );
            return Ok(0);
        };
        Ok(install_config::control_plane_replicas(document)?)
    }

    async fn read_tier(&self, cluster: &dyn ClusterReader, name: &str) -> Result<Option<TierState>> {
        cluster
            .daemon_set(&self.datapath_namespace, name)
            .await
            .map_err(|e| {
                RolloutError::KubernetesApi(format!(
                    "reading DaemonSet {}/{name}: {e}",
                    self.datapath_namespace
                ))
                .into()
            })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    /// Cluster reader backed by in-memory objects.
    #[derive(Default)]
    pub struct FakeCluster {
        pub config_maps: BTreeMap<(String, String), BTreeMap<String, String>>,
        pub failing_config_maps: Vec<(String, String)>,
        pub daemon_sets: BTreeMap<String, TierState>,
        pub infra: InfraStatus,
    }

    impl FakeCluster {
        /// A cluster whose install config asks for `replicas` members.
        pub fn with_replicas(replicas: usize) -> Self {
            let mut cluster = Self::default();
            cluster.put_config_map(
                CLUSTER_CONFIG_NAMESPACE,
                CLUSTER_CONFIG_NAME,
                &[(
                    INSTALL_CONFIG_KEY,
                    &format!("controlPlane:\n  replicas: {replicas}\n"),
                )],
            );
            cluster
        }

        pub fn put_config_map(&mut self, namespace: &str, name: &str, data: &[(&str, &str)]) {
            self.config_maps.insert(
                (namespace.to_string(), name.to_string()),
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
        }

        pub fn put_tier(&mut self, tier: TierState) {
            self.daemon_sets.insert(tier.name.clone(), tier);
        }
    }

    #[async_trait]
    impl ClusterReader for FakeCluster {
        async fn config_map(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<BTreeMap<String, String>>> {
            let key = (namespace.to_string(), name.to_string());
            if self.failing_config_maps.contains(&key) {
                anyhow::bail!("forbidden: {namespace}/{name}");
            }
            Ok(self.config_maps.get(&key).cloned())
        }

        async fn daemon_set(&self, _namespace: &str, name: &str) -> Result<Option<TierState>> {
            Ok(self.daemon_sets.get(name).cloned())
        }

        async fn infrastructure(&self) -> Result<InfraStatus> {
            Ok(self.infra.clone())
        }
    }
}
