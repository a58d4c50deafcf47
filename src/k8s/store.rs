//! State store persisting values as annotations on the `Network` object.

use anyhow::Result;
use async_trait::async_trait;
use kube::Api;
use kube::api::{Patch, PatchParams};
use tracing::debug;

use crate::crd::Network;
use crate::error::RolloutError;
use crate::state::StateStore;

/// Annotation-backed store on one cluster-scoped `Network`.
pub struct AnnotationStore {
    api: Api<Network>,
    name: String,
}

impl AnnotationStore {
    pub fn new(client: kube::Client, name: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            name: name.into(),
        }
    }
}

#[async_trait]
impl StateStore for AnnotationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let network = self.api.get(&self.name).await.map_err(|e| {
            RolloutError::KubernetesApi(format!("Failed to get Network {}: {e}", self.name))
        })?;
        Ok(network
            .metadata
            .annotations
            .and_then(|mut a| a.remove(key)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Setting annotation {} on Network {}", key, self.name);
        let patch = serde_json::json!({
            "metadata": { "annotations": { key: value } }
        });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                RolloutError::KubernetesApi(format!(
                    "Failed to annotate Network {}: {e}",
                    self.name
                ))
            })?;
        Ok(())
    }
}
