//! Manifest rendering and loading.
//!
//! Manifests are minijinja templates with `${KEY}` variables and `{% %}`
//! blocks, so sections can depend on the node mode, IPsec or hybrid overlay.
//! Referencing a key that is not in the render data fails the render.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use kube::api::DynamicObject;
use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Deserialize;
use tracing::debug;

use crate::bootstrap::ClusterSnapshot;
use crate::crd::NetworkSpec;
use crate::error::RolloutError;
use crate::names::{NB_DB_PORT, NB_RAFT_PORT, SB_DB_PORT, SB_RAFT_PORT};

/// Template context of one pass, keyed by variable name.
pub type RenderData = BTreeMap<&'static str, Value>;

/// Build the render data of one pass from the defaulted spec and snapshot.
pub fn render_data(spec: &NetworkSpec, snapshot: &ClusterSnapshot, release: &str) -> RenderData {
    let mut data = RenderData::new();
    data.insert("OVN_NB_DB_LIST", Value::from(snapshot.db_list(NB_DB_PORT)));
    data.insert("OVN_SB_DB_LIST", Value::from(snapshot.db_list(SB_DB_PORT)));
    data.insert("OVN_NB_RAFT_PORT", Value::from(NB_RAFT_PORT.to_string()));
    data.insert("OVN_SB_RAFT_PORT", Value::from(SB_RAFT_PORT.to_string()));
    data.insert("LISTEN_DUAL_STACK", Value::from(snapshot.listen_dual_stack()));
    data.insert("OVN_MIN_AVAILABLE", Value::from(snapshot.min_available().to_string()));
    data.insert("OVN_INITIATOR", Value::from(snapshot.initiator.clone()));
    data.insert("OVN_NODE_MODE", Value::from(snapshot.node_mode.to_string()));
    data.insert("OVN_GATEWAY_MODE", Value::from(snapshot.gateway_mode.to_string()));
    data.insert("SINGLE_NODE", Value::from(snapshot.is_single_node()));
    data.insert("RELEASE_VERSION", Value::from(release));

    let ovn = spec.ovn();
    let opt = |v: Option<u32>| Value::from(v.map(|v| v.to_string()).unwrap_or_default());
    data.insert("MTU", opt(ovn.and_then(|o| o.mtu)));
    data.insert("GENEVE_PORT", opt(ovn.and_then(|o| o.geneve_port)));
    data.insert(
        "IPSEC_ENABLED",
        Value::from(ovn.is_some_and(|o| o.ipsec_config.is_some())),
    );
    data.insert(
        "HYBRID_OVERLAY_ENABLED",
        Value::from(ovn.is_some_and(|o| o.hybrid_overlay_config.is_some())),
    );

    data.insert(
        "IPFIX_COLLECTORS",
        Value::from(snapshot.ipfix_collectors(spec).unwrap_or_default()),
    );
    let flows = snapshot.flows.as_ref();
    data.insert(
        "IPFIX_CACHE_ACTIVE_TIMEOUT",
        opt(flows.and_then(|f| f.cache_active_timeout)),
    );
    data.insert(
        "IPFIX_CACHE_MAX_FLOWS",
        opt(flows.and_then(|f| f.cache_max_flows)),
    );
    data.insert("IPFIX_SAMPLING", opt(flows.and_then(|f| f.sampling)));
    data
}

/// Template environment for datapath manifests.
pub struct ManifestRenderer {
    env: Environment<'static>,
}

impl ManifestRenderer {
    pub fn new() -> Result<Self> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("${", "}")
            .block_delimiters("{%", "%}")
            .comment_delimiters("{#", "#}")
            .build()
            .map_err(|e| RolloutError::Manifest(format!("template syntax: {e}")))?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Ok(Self { env })
    }

    /// Render one manifest template. `source` names it in errors.
    pub fn render(&self, template: &str, source: &str, data: &RenderData) -> Result<String> {
        self.env
            .render_str(template, data)
            .map_err(|e| RolloutError::Manifest(format!("{source}: {e}")).into())
    }
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        RolloutError::Manifest(format!("Failed to read manifest dir {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| RolloutError::Manifest(e.to_string()))?
            .path();
        let is_manifest = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"));
        if path.is_file() && is_manifest {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Parse every document of a multi-document YAML text. Empty documents are skipped.
pub fn parse_documents(text: &str, source: &str) -> Result<Vec<DynamicObject>> {
    let mut objs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| RolloutError::Manifest(format!("{source}: {e}")))?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| RolloutError::Manifest(format!("{source}: {e}")))?;
        objs.push(obj);
    }
    Ok(objs)
}

/// Render and load all manifests under `dir` in file name order.
pub fn load_manifests(dir: &Path, data: &RenderData) -> Result<Vec<DynamicObject>> {
    let renderer = ManifestRenderer::new()?;
    let mut objs = Vec::new();
    for path in manifest_files(dir)? {
        let source = path.display().to_string();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| RolloutError::Manifest(format!("Failed to read {source}: {e}")))?;
        let parsed = parse_documents(&renderer.render(&text, &source, data)?, &source)?;
        debug!("Loaded {} objects from {}", parsed.len(), source);
        objs.extend(parsed);
    }
    Ok(objs)
}
