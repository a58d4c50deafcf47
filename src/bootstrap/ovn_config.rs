//! Node and gateway mode overrides read from auxiliary config maps.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::crd::{GatewayMode, NodeMode};
use crate::names::{DPU_MODE_CONFIG, GATEWAY_MODE_CONFIG};

/// Node mode from the `dpu-mode-config` data. Absent map means full mode;
/// an unknown value is logged and also yields full mode.
pub fn node_mode(data: Option<&BTreeMap<String, String>>) -> NodeMode {
    let Some(data) = data else {
        info!("Did not find {}", DPU_MODE_CONFIG);
        return NodeMode::Full;
    };
    let value = data.get("mode").map_or("", String::as_str);
    match NodeMode::from_override(value) {
        Some(mode) => {
            info!("Overriding OVN node mode to {}", mode);
            mode
        }
        None => {
            warn!(
                "{} mode {:?} does not match dpu or dpu-host, using full node mode",
                DPU_MODE_CONFIG, value
            );
            NodeMode::Full
        }
    }
}

/// Gateway mode from the `gateway-mode-config` read. Every failure, including
/// a read error, falls back to shared mode.
pub fn gateway_mode(read: Result<Option<BTreeMap<String, String>>>) -> GatewayMode {
    let mode = match read {
        Ok(Some(data)) => {
            let value = data.get("mode").map_or("", String::as_str);
            GatewayMode::from_config(value).unwrap_or_else(|| {
                warn!(
                    "{} mode {:?} does not match local or shared, using shared gateway mode",
                    GATEWAY_MODE_CONFIG, value
                );
                GatewayMode::Shared
            })
        }
        Ok(None) => {
            info!("Did not find {}, using shared gateway mode", GATEWAY_MODE_CONFIG);
            GatewayMode::Shared
        }
        Err(e) => {
            info!("Could not read {}, using shared gateway mode: {}", GATEWAY_MODE_CONFIG, e);
            GatewayMode::Shared
        }
    };
    info!("Gateway mode resolved to {}", mode);
    mode
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("mode".to_string(), value.to_string())])
    }

    #[test]
    fn test_node_mode() {
        assert_eq!(node_mode(None), NodeMode::Full);
        assert_eq!(node_mode(Some(&mode("dpu"))), NodeMode::Dpu);
        assert_eq!(node_mode(Some(&mode("dpu-host"))), NodeMode::DpuHost);
        assert_eq!(node_mode(Some(&mode("smart-nic"))), NodeMode::Full);
        assert_eq!(node_mode(Some(&BTreeMap::new())), NodeMode::Full);
    }

    #[test]
    fn test_gateway_mode() {
        assert_eq!(gateway_mode(Ok(Some(mode("local")))), GatewayMode::Local);
        assert_eq!(gateway_mode(Ok(Some(mode("shared")))), GatewayMode::Shared);
        assert_eq!(gateway_mode(Ok(Some(mode("hybrid")))), GatewayMode::Shared);
        assert_eq!(gateway_mode(Ok(None)), GatewayMode::Shared);
        assert_eq!(
            gateway_mode(Err(anyhow::anyhow!("forbidden"))),
            GatewayMode::Shared
        );
    }
}
