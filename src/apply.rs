//! Turns a rollout decision into the set of objects to apply, and applies it.
//!
//! Rendered objects are stamped with the family and release markers. Tiers the
//! decision holds back are replaced by their live objects so applying the set
//! leaves them untouched, and the pre-pull DaemonSet is dropped unless the
//! decision asks for it.

pub mod manifest;

use anyhow::Result;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::{Scope, pinned_kind};
use kube::{Api, ResourceExt};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::RolloutError;
use crate::names::{
    FIELD_MANAGER, IP_FAMILY_MODE_ANNOTATION, MASTER_DAEMONSET, NODE_DAEMONSET,
    PREPULLER_DAEMONSET, RELEASE_VERSION_ANNOTATION,
};
use crate::rollout::{IpFamilyMode, RolloutDecision};

/// Group/kind/namespace/name of an object.
#[derive(Debug, PartialEq, Eq)]
struct ObjectKey<'a> {
    group: &'a str,
    kind: &'a str,
    namespace: Option<&'a str>,
    name: Option<&'a str>,
}

fn key_of(obj: &DynamicObject) -> ObjectKey<'_> {
    let (group, kind) = obj.types.as_ref().map_or(("", ""), |t| {
        let group = t.api_version.rsplit_once('/').map_or("", |(g, _)| g);
        (group, t.kind.as_str())
    });
    ObjectKey {
        group,
        kind,
        namespace: obj.metadata.namespace.as_deref(),
        name: obj.metadata.name.as_deref(),
    }
}

fn is_daemonset(obj: &DynamicObject, name: &str) -> bool {
    let key = key_of(obj);
    key.group == "apps" && key.kind == "DaemonSet" && key.name == Some(name)
}

fn set_template_annotation(data: &mut Value, key: &str, value: &str) {
    let mut cursor = data;
    for field in ["spec", "template", "metadata", "annotations"] {
        let Some(map) = cursor.as_object_mut() else {
            return;
        };
        cursor = map
            .entry(field)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(annotations) = cursor.as_object_mut() {
        annotations.insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// Stamp the family marker on the master and node DaemonSets and their pod
/// templates, and the release marker on every tier DaemonSet.
pub fn stamp(objs: &mut [DynamicObject], family: IpFamilyMode, release: &str) {
    for obj in objs.iter_mut() {
        if is_daemonset(obj, MASTER_DAEMONSET) || is_daemonset(obj, NODE_DAEMONSET) {
            obj.annotations_mut()
                .insert(IP_FAMILY_MODE_ANNOTATION.to_string(), family.as_marker().to_string());
            set_template_annotation(&mut obj.data, IP_FAMILY_MODE_ANNOTATION, family.as_marker());
        }
        if [MASTER_DAEMONSET, NODE_DAEMONSET, PREPULLER_DAEMONSET]
            .iter()
            .any(|name| is_daemonset(obj, name))
        {
            obj.annotations_mut()
                .insert(RELEASE_VERSION_ANNOTATION.to_string(), release.to_string());
        }
    }
}

/// Replace the object with the same identity, or append when none matches.
fn replace_obj(objs: &mut Vec<DynamicObject>, replacement: DynamicObject) {
    if let Some(slot) = objs.iter_mut().find(|o| key_of(o) == key_of(&replacement)) {
        *slot = replacement;
    } else {
        objs.push(replacement);
    }
}

/// Live tier objects used in place of held-back rendered ones.
#[derive(Clone, Debug, Default)]
pub struct LiveTiers {
    pub master: Option<DynamicObject>,
    pub node: Option<DynamicObject>,
}

/// Apply the decision to the rendered set.
pub fn plan(
    mut objs: Vec<DynamicObject>,
    decision: &RolloutDecision,
    live: LiveTiers,
) -> Vec<DynamicObject> {
    if !decision.update_master
        && let Some(master) = live.master
    {
        debug!("Holding back {}", MASTER_DAEMONSET);
        replace_obj(&mut objs, master);
    }
    if !decision.update_node
        && let Some(node) = live.node
    {
        debug!("Holding back {}", NODE_DAEMONSET);
        replace_obj(&mut objs, node);
    }
    if !decision.render_prepull {
        objs.retain(|o| !is_daemonset(o, PREPULLER_DAEMONSET));
    }
    objs
}

/// Strip server-owned metadata so a live object can be re-applied.
fn for_reapply(mut obj: DynamicObject) -> DynamicObject {
    obj.metadata.managed_fields = None;
    obj.metadata.resource_version = None;
    if let Some(data) = obj.data.as_object_mut() {
        data.remove("status");
    }
    obj
}

fn daemonset_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("apps", "v1", "DaemonSet"), "daemonsets")
}

/// Server-side applier for rendered objects.
pub struct Applier {
    client: kube::Client,
    datapath_namespace: String,
}

impl Applier {
    pub fn new(client: kube::Client, datapath_namespace: impl Into<String>) -> Self {
        Self {
            client,
            datapath_namespace: datapath_namespace.into(),
        }
    }

    /// Fetch the live tiers the decision holds back.
    pub async fn live_tiers(&self, decision: &RolloutDecision) -> Result<LiveTiers> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &self.datapath_namespace,
            &daemonset_api_resource(),
        );
        let fetch = |name: &'static str| {
            let api = api.clone();
            async move {
                api.get_opt(name).await.map_err(|e| {
                    RolloutError::KubernetesApi(format!("Failed to get DaemonSet {name}: {e}"))
                })
            }
        };

        let master = if decision.update_master {
            None
        } else {
            fetch(MASTER_DAEMONSET).await?.map(for_reapply)
        };
        let node = if decision.update_node {
            None
        } else {
            fetch(NODE_DAEMONSET).await?.map(for_reapply)
        };
        Ok(LiveTiers { master, node })
    }

    /// Server-side apply every object; returns how many were applied.
    pub async fn apply(&self, objs: &[DynamicObject]) -> Result<usize> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for obj in objs {
            let types = obj.types.as_ref().ok_or_else(|| {
                RolloutError::Manifest(format!("{} has no apiVersion/kind", obj.name_any()))
            })?;
            let gvk = GroupVersionKind::try_from(types)
                .map_err(|e| RolloutError::Manifest(e.to_string()))?;
            let (ar, caps) = pinned_kind(&self.client, &gvk).await.map_err(|e| {
                RolloutError::KubernetesApi(format!("Failed to discover {}: {e}", types.kind))
            })?;

            let api: Api<DynamicObject> = match (caps.scope, obj.namespace()) {
                (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), &ns, &ar),
                (Scope::Namespaced, None) => {
                    Api::namespaced_with(self.client.clone(), &self.datapath_namespace, &ar)
                }
                (Scope::Cluster, _) => Api::all_with(self.client.clone(), &ar),
            };

            let name = obj.name_any();
            api.patch(&name, &params, &Patch::Apply(obj)).await.map_err(|e| {
                RolloutError::KubernetesApi(format!("Failed to apply {} {name}: {e}", types.kind))
            })?;
            debug!("Applied {} {}", types.kind, name);
        }
        info!("Applied {} objects", objs.len());
        Ok(objs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(api_version: &str, kind: &str, name: &str) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name, "namespace": "openshift-ovn-kubernetes" },
            "spec": { "template": { "spec": { "containers": [] } } }
        }))
        .unwrap()
    }

    fn rendered() -> Vec<DynamicObject> {
        vec![
            obj("v1", "ConfigMap", "ovnkube-config"),
            obj("apps/v1", "DaemonSet", MASTER_DAEMONSET),
            obj("apps/v1", "DaemonSet", NODE_DAEMONSET),
            obj("apps/v1", "DaemonSet", PREPULLER_DAEMONSET),
        ]
    }

    fn live(name: &str, version: &str) -> DynamicObject {
        let mut o = obj("apps/v1", "DaemonSet", name);
        o.annotations_mut()
            .insert(RELEASE_VERSION_ANNOTATION.to_string(), version.to_string());
        o
    }

    fn names(objs: &[DynamicObject]) -> Vec<String> {
        objs.iter().map(ResourceExt::name_any).collect()
    }

    #[test]
    fn test_stamp_family_and_release() {
        let mut objs = rendered();
        stamp(&mut objs, IpFamilyMode::DualStack, "4.11.0");

        for o in &objs[1..3] {
            assert_eq!(o.annotations()[IP_FAMILY_MODE_ANNOTATION], "dual-stack");
            assert_eq!(
                o.data["spec"]["template"]["metadata"]["annotations"][IP_FAMILY_MODE_ANNOTATION],
                "dual-stack"
            );
            assert_eq!(o.annotations()[RELEASE_VERSION_ANNOTATION], "4.11.0");
        }
        assert!(!objs[3].annotations().contains_key(IP_FAMILY_MODE_ANNOTATION));
        assert_eq!(objs[3].annotations()[RELEASE_VERSION_ANNOTATION], "4.11.0");
        assert!(objs[0].annotations().is_empty());
    }

    #[test]
    fn test_stamp_creates_missing_template() {
        let mut objs = vec![serde_json::from_value::<DynamicObject>(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": { "name": MASTER_DAEMONSET }
        }))
        .unwrap()];
        stamp(&mut objs, IpFamilyMode::SingleStack, "4.11.0");
        assert_eq!(
            objs[0].data["spec"]["template"]["metadata"]["annotations"][IP_FAMILY_MODE_ANNOTATION],
            "single-stack"
        );
    }

    #[test]
    fn test_plan_updates_everything() {
        let decision = RolloutDecision {
            update_master: true,
            update_node: true,
            render_prepull: true,
        };
        let got = plan(rendered(), &decision, LiveTiers::default());
        assert_eq!(names(&got), names(&rendered()));
    }

    #[test]
    fn test_plan_holds_master_and_drops_prepull() {
        let decision = RolloutDecision {
            update_master: false,
            update_node: true,
            render_prepull: false,
        };
        let live_tiers = LiveTiers {
            master: Some(live(MASTER_DAEMONSET, "4.10.0")),
            node: None,
        };
        let got = plan(rendered(), &decision, live_tiers);
        assert_eq!(
            names(&got),
            vec!["ovnkube-config", MASTER_DAEMONSET, NODE_DAEMONSET]
        );
        assert_eq!(got[1].annotations()[RELEASE_VERSION_ANNOTATION], "4.10.0");
        assert!(!got[2].annotations().contains_key(RELEASE_VERSION_ANNOTATION));
    }

    #[test]
    fn test_plan_holds_node_for_prepull() {
        let decision = RolloutDecision {
            update_master: false,
            update_node: false,
            render_prepull: true,
        };
        let live_tiers = LiveTiers {
            master: Some(live(MASTER_DAEMONSET, "4.10.0")),
            node: Some(live(NODE_DAEMONSET, "4.10.0")),
        };
        let got = plan(rendered(), &decision, live_tiers);
        assert_eq!(names(&got), names(&rendered()));
        assert_eq!(got[1].annotations()[RELEASE_VERSION_ANNOTATION], "4.10.0");
        assert_eq!(got[2].annotations()[RELEASE_VERSION_ANNOTATION], "4.10.0");
    }

    #[test]
    fn test_replace_appends_when_not_rendered() {
        let mut objs = vec![obj("v1", "ConfigMap", "ovnkube-config")];
        replace_obj(&mut objs, live(NODE_DAEMONSET, "4.10.0"));
        assert_eq!(names(&objs), vec!["ovnkube-config", NODE_DAEMONSET]);
    }

    #[test]
    fn test_identity_ignores_version() {
        let a = obj("apps/v1", "DaemonSet", NODE_DAEMONSET);
        let b = obj("apps/v1beta2", "DaemonSet", NODE_DAEMONSET);
        let c = obj("extensions/v1beta1", "DaemonSet", NODE_DAEMONSET);
        assert_eq!(key_of(&a), key_of(&b));
        assert_ne!(key_of(&a), key_of(&c));
        assert_eq!(key_of(&obj("v1", "ConfigMap", "x")).group, "");
    }

    #[test]
    fn test_for_reapply_strips_server_fields() {
        let mut o = live(NODE_DAEMONSET, "4.10.0");
        o.metadata.resource_version = Some("123".into());
        o.metadata.managed_fields = Some(vec![Default::default()]);
        let o = for_reapply(o);
        assert!(o.metadata.resource_version.is_none());
        assert!(o.metadata.managed_fields.is_none());
    }
}
