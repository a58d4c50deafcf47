//! Well-known object names, annotation keys, and datapath ports.

/// Annotation on the `Network` object naming the database cluster initiator.
pub const CLUSTER_INITIATOR_ANNOTATION: &str = "network.operator.openshift.io/ovn-cluster-initiator";

/// Annotation on the `Network` object holding the last applied spec (JSON).
pub const APPLIED_SPEC_ANNOTATION: &str = "network.operator.openshift.io/applied-spec";

/// Family mode marker stamped on the master and node DaemonSets.
pub const IP_FAMILY_MODE_ANNOTATION: &str = "networkoperator.openshift.io/ip-family-mode";

/// Set by the status reporter when a DaemonSet rollout stopped making progress.
pub const ROLLOUT_HUNG_ANNOTATION: &str = "networkoperator.openshift.io/rollout-hung";

/// Release version marker carried by every tier DaemonSet.
pub const RELEASE_VERSION_ANNOTATION: &str = "release.openshift.io/version";

/// Label selecting control-plane nodes.
pub const CONTROL_PLANE_NODE_LABEL: &str = "node-role.kubernetes.io/master";

pub const MASTER_DAEMONSET: &str = "ovnkube-master";
pub const NODE_DAEMONSET: &str = "ovnkube-node";
pub const PREPULLER_DAEMONSET: &str = "ovnkube-upgrades-prepuller";

pub const CLUSTER_CONFIG_NAMESPACE: &str = "kube-system";
pub const CLUSTER_CONFIG_NAME: &str = "cluster-config-v1";
pub const INSTALL_CONFIG_KEY: &str = "install-config";

pub const DPU_MODE_CONFIG: &str = "dpu-mode-config";
pub const GATEWAY_MODE_CONFIG: &str = "gateway-mode-config";
pub const FLOWS_CONFIG: &str = "ovs-flows-config";

pub const NB_DB_PORT: u16 = 9641;
pub const SB_DB_PORT: u16 = 9642;
pub const NB_RAFT_PORT: u16 = 9643;
pub const SB_RAFT_PORT: u16 = 9644;

/// Field manager used for server-side apply and status patches.
pub const FIELD_MANAGER: &str = "cnro";
