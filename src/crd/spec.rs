//! `Network` spec types.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::RolloutStatus;

/// `Network` describes the desired cluster network configuration.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "operator.openshift.io",
    version = "v1",
    kind = "Network",
    status = "RolloutStatus",
    printcolumn = r#"{"name":"INITIATOR","type":"string","jsonPath":".status.initiator"}"#,
    printcolumn = r#"{"name":"MASTER","type":"boolean","jsonPath":".status.decision.updateMaster"}"#,
    printcolumn = r#"{"name":"NODE","type":"boolean","jsonPath":".status.decision.updateNode"}"#,
    printcolumn = r#"{"name":"PREPULL","type":"boolean","jsonPath":".status.decision.renderPrepull"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Pod address pools.
    #[serde(default)]
    pub cluster_network: Vec<ClusterNetworkEntry>,

    /// Service address pools: one CIDR, or a dual-stack pair.
    #[serde(default)]
    pub service_network: Vec<String>,

    #[serde(default)]
    pub default_network: DefaultNetwork,

    /// In-flight configuration migrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<NetworkMigration>,

    /// Flow export collectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_network_flows: Option<ExportNetworkFlows>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkEntry {
    pub cidr: String,
    #[serde(default)]
    pub host_prefix: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultNetwork {
    #[serde(rename = "type", default)]
    pub network_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovn_kubernetes_config: Option<OvnKubernetesConfig>,
}

/// OVN-Kubernetes datapath settings.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvnKubernetesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geneve_port: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_overlay_config: Option<HybridOverlayConfig>,

    #[serde(
        rename = "ipsecConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ipsec_config: Option<IpsecConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_config: Option<GatewayConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_audit_config: Option<PolicyAuditConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HybridOverlayConfig {
    #[serde(default)]
    pub hybrid_cluster_network: Vec<ClusterNetworkEntry>,

    #[serde(
        rename = "hybridOverlayVXLANPort",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hybrid_overlay_vxlan_port: Option<u32>,
}

/// Presence enables IPsec; there are no tunables.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct IpsecConfig {}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Route egress traffic through the host network stack (local gateway).
    #[serde(default)]
    pub routing_via_host: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAuditConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u32>,

    #[serde(default)]
    pub destination: String,

    #[serde(default)]
    pub syslog_facility: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMigration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<MtuMigration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MtuMigration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<MtuMigrationValues>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<MtuMigrationValues>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MtuMigrationValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportNetworkFlows {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_flow: Option<FlowCollectors>,

    #[serde(rename = "sFlow", default, skip_serializing_if = "Option::is_none")]
    pub s_flow: Option<FlowCollectors>,

    #[serde(rename = "ipfix", default, skip_serializing_if = "Option::is_none")]
    pub ipfix: Option<FlowCollectors>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct FlowCollectors {
    /// Collector endpoints as `ip:port`.
    #[serde(default)]
    pub collectors: Vec<String>,
}

impl NetworkSpec {
    /// OVN-Kubernetes settings, if present.
    pub fn ovn(&self) -> Option<&OvnKubernetesConfig> {
        self.default_network.ovn_kubernetes_config.as_ref()
    }

    /// IPFIX collectors configured on the spec, comma-joined.
    pub fn ipfix_collectors(&self) -> String {
        self.export_network_flows
            .as_ref()
            .and_then(|f| f.ipfix.as_ref())
            .map(|c| c.collectors.join(","))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserializes_from_operator_yaml() {
        let yaml = r"
clusterNetwork:
  - cidr: 10.128.0.0/14
    hostPrefix: 23
serviceNetwork:
  - 172.30.0.0/16
  - fd02::/112
defaultNetwork:
  type: OVNKubernetes
  ovnKubernetesConfig:
    mtu: 1400
    genevePort: 6081
    ipsecConfig: {}
    hybridOverlayConfig:
      hybridClusterNetwork:
        - cidr: 10.132.0.0/14
          hostPrefix: 23
      hybridOverlayVXLANPort: 9898
    gatewayConfig:
      routingViaHost: true
exportNetworkFlows:
  ipfix:
    collectors: [192.168.1.10:2055]
";
        let spec: NetworkSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.service_network.len(), 2);
        assert_eq!(spec.cluster_network[0].host_prefix, 23);
        let ovn = spec.ovn().unwrap();
        assert_eq!(ovn.mtu, Some(1400));
        assert!(ovn.ipsec_config.is_some());
        assert_eq!(
            ovn.hybrid_overlay_config
                .as_ref()
                .unwrap()
                .hybrid_overlay_vxlan_port,
            Some(9898)
        );
        assert!(ovn.gateway_config.as_ref().unwrap().routing_via_host);
        assert_eq!(spec.ipfix_collectors(), "192.168.1.10:2055");
    }

    #[test]
    fn test_empty_spec_defaults() {
        let spec: NetworkSpec = serde_json::from_str("{}").unwrap();
        assert!(spec.cluster_network.is_empty());
        assert!(spec.ovn().is_none());
        assert_eq!(spec.ipfix_collectors(), "");
    }
}
