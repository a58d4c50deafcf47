//! Desired control-plane replica count from the install-time configuration.

use serde::Deserialize;
use tracing::warn;

use crate::error::RolloutError;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct InstallConfig {
    #[serde(default)]
    control_plane: Option<MachinePool>,
}

#[derive(Deserialize, Debug, Default)]
struct MachinePool {
    #[serde(default)]
    replicas: Option<Replicas>,
}

/// `controlPlane.replicas` is written either as a number or as a string.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Replicas {
    Count(u64),
    Text(String),
}

/// Parse the `install-config` document and return the desired number of
/// control-plane replicas.
///
/// An absent or non-numeric replica count yields 0, which makes discovery
/// wait for its deadline and continue with whatever members it found.
pub fn control_plane_replicas(document: &str) -> Result<usize, RolloutError> {
    let config: InstallConfig = serde_yaml::from_str(document)
        .map_err(|e| RolloutError::InstallConfig(e.to_string()))?;

    let replicas = config.control_plane.and_then(|pool| pool.replicas);
    let count = match replicas {
        Some(Replicas::Count(n)) => usize::try_from(n).unwrap_or(0),
        Some(Replicas::Text(text)) => text.trim().parse::<usize>().unwrap_or_else(|_| {
            warn!("Unparsable control plane replica count {:?}, assuming 0", text);
            0
        }),
        None => {
            warn!("Install config carries no control plane replica count, assuming 0");
            0
        }
    };
    Ok(count)
}
