//! Kubernetes-backed node directory and cluster reader.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::Api;
use kube::api::{ApiResource, DynamicObject, ListParams};
use tracing::{debug, warn};

use crate::bootstrap::{ClusterReader, ControlPlaneNode, InfraStatus, NodeDirectory};
use crate::crd::ControlPlaneTopology;
use crate::error::RolloutError;
use crate::names::{
    CONTROL_PLANE_NODE_LABEL, IP_FAMILY_MODE_ANNOTATION, RELEASE_VERSION_ANNOTATION,
    ROLLOUT_HUNG_ANNOTATION,
};
use crate::rollout::{IpFamilyMode, ProgressStatus, TierState};

/// `config.openshift.io/v1` Infrastructure, read through the dynamic API.
fn infrastructure_api_resource() -> ApiResource {
    ApiResource {
        group: "config.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "config.openshift.io/v1".to_string(),
        kind: "Infrastructure".to_string(),
        plural: "infrastructures".to_string(),
    }
}

/// Live cluster access through a `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeDirectory for KubeCluster {
    async fn control_plane_nodes(&self) -> Result<Vec<ControlPlaneNode>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default().labels(CONTROL_PLANE_NODE_LABEL))
            .await
            .map_err(|e| RolloutError::NodeDirectory(format!("Failed to list nodes: {e}")))?;

        debug!("Found {} control plane nodes", list.items.len());
        Ok(list.items.iter().map(control_plane_node).collect())
    }
}

#[async_trait]
impl ClusterReader for KubeCluster {
    async fn config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = api.get_opt(name).await.map_err(|e| {
            RolloutError::KubernetesApi(format!("Failed to get ConfigMap {namespace}/{name}: {e}"))
        })?;
        Ok(cm.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<TierState>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let ds = api.get_opt(name).await.map_err(|e| {
            RolloutError::KubernetesApi(format!("Failed to get DaemonSet {namespace}/{name}: {e}"))
        })?;
        Ok(ds.as_ref().map(tier_state))
    }

    async fn infrastructure(&self) -> Result<InfraStatus> {
        let ar = infrastructure_api_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let infra = api.get_opt("cluster").await.map_err(|e| {
            RolloutError::KubernetesApi(format!("Failed to get Infrastructure: {e}"))
        })?;
        Ok(infra.map(|obj| infra_status(&obj.data)).unwrap_or_default())
    }
}

fn control_plane_node(node: &Node) -> ControlPlaneNode {
    let internal_address = node
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone());
    ControlPlaneNode {
        name: node.metadata.name.clone().unwrap_or_default(),
        internal_address,
    }
}

/// Read the tier markers and rollout counters off a DaemonSet.
pub fn tier_state(ds: &DaemonSet) -> TierState {
    let annotations = ds.metadata.annotations.as_ref();
    let annotation = |key: &str| annotations.and_then(|a| a.get(key)).cloned();

    let family_mode = annotation(IP_FAMILY_MODE_ANNOTATION).and_then(|marker| {
        let mode = IpFamilyMode::from_marker(&marker);
        if mode.is_none() {
            warn!(
                "Unrecognized IP family marker {} on DaemonSet {}, treating as absent",
                marker,
                ds.metadata.name.as_deref().unwrap_or_default()
            );
        }
        mode
    });

    let status = ds.status.as_ref();
    let progress = ProgressStatus {
        desired: status.map_or(0, |s| i64::from(s.desired_number_scheduled)),
        updated: status
            .and_then(|s| s.updated_number_scheduled)
            .map_or(0, i64::from),
        available: status.and_then(|s| s.number_available).map_or(0, i64::from),
        unavailable: status
            .and_then(|s| s.number_unavailable)
            .map_or(0, i64::from),
        generation: ds.metadata.generation.unwrap_or(0),
        observed_generation: status.and_then(|s| s.observed_generation).unwrap_or(0),
    };

    TierState {
        namespace: ds.metadata.namespace.clone().unwrap_or_default(),
        name: ds.metadata.name.clone().unwrap_or_default(),
        version: annotation(RELEASE_VERSION_ANNOTATION),
        family_mode,
        hung: annotation(ROLLOUT_HUNG_ANNOTATION).is_some(),
        progress,
    }
}

fn infra_status(data: &serde_json::Value) -> InfraStatus {
    let status = &data["status"];
    InfraStatus {
        topology: ControlPlaneTopology::from_status(status["controlPlaneTopology"].as_str()),
        platform_type: status["platformStatus"]["type"]
            .as_str()
            .or_else(|| status["platform"].as_str())
            .unwrap_or_default()
            .to_string(),
    }
}
