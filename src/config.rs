use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Environment variable names read by the operator.
pub mod env {
    pub const RELEASE_VERSION: &str = "RELEASE_VERSION";
    pub const MANIFEST_DIR: &str = "MANIFEST_DIR";
    pub const NETWORK_NAME: &str = "NETWORK_NAME";
    pub const DATAPATH_NAMESPACE: &str = "DATAPATH_NAMESPACE";
    pub const OPERATOR_NAMESPACE: &str = "OPERATOR_NAMESPACE";
    pub const HOST_MTU: &str = "HOST_MTU";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const HEALTH_PORT: &str = "HEALTH_PORT";
    pub const METRICS_PORT: &str = "METRICS_PORT";
    pub const REQUEUE_SECS: &str = "REQUEUE_SECS";
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show version information
    Version,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cnro",
    version,
    about = "Cluster network rollout operator",
    long_about = "Bootstraps the OVN-Kubernetes control plane and sequences master, node and pre-pull DaemonSet rollouts across release upgrades and IP family conversions."
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Release version the datapath is rolled to
    #[arg(long, env = env::RELEASE_VERSION)]
    pub release_version: Option<String>,

    /// Directory holding the datapath manifests
    #[arg(long, env = env::MANIFEST_DIR, default_value = "/bindata/network/ovn-kubernetes")]
    pub manifest_dir: PathBuf,

    /// Name of the cluster-scoped Network object to reconcile
    #[arg(long, env = env::NETWORK_NAME, default_value = "cluster")]
    pub network_name: String,

    /// Namespace of the datapath DaemonSets
    #[arg(long, env = env::DATAPATH_NAMESPACE, default_value = "openshift-ovn-kubernetes")]
    pub datapath_namespace: String,

    /// Namespace of the operator's auxiliary config maps
    #[arg(long, env = env::OPERATOR_NAMESPACE, default_value = "openshift-network-operator")]
    pub operator_namespace: String,

    /// MTU of the host network, used to derive the pod MTU
    #[arg(long, env = env::HOST_MTU, default_value = "1500")]
    pub host_mtu: u32,

    /// Log format: json or pretty
    #[arg(long, env = env::LOG_FORMAT, default_value = "json")]
    pub log_format: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = env::LOG_LEVEL, default_value = "info")]
    pub log_level: String,

    /// Health check server port
    #[arg(long, env = env::HEALTH_PORT, default_value = "8080")]
    pub health_port: u16,

    /// Metrics server port
    #[arg(long, env = env::METRICS_PORT, default_value = "8081")]
    pub metrics_port: u16,

    /// Seconds between periodic reconciles
    #[arg(long, env = env::REQUEUE_SECS, default_value = "180")]
    pub requeue_secs: u64,
}

impl Config {
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Validate settings the operator cannot run without.
    pub fn validate(&self) -> Result<(), String> {
        if self.release().is_empty() {
            return Err(format!("{} is required", env::RELEASE_VERSION));
        }
        if self.requeue_secs == 0 {
            return Err(format!("{} must be greater than 0", env::REQUEUE_SECS));
        }
        Ok(())
    }

    pub fn release(&self) -> &str {
        self.release_version.as_deref().unwrap_or("")
    }

    pub const fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("cnro").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--release-version", "4.11.0"]);
        assert_eq!(config.release(), "4.11.0");
        assert_eq!(config.network_name, "cluster");
        assert_eq!(config.datapath_namespace, "openshift-ovn-kubernetes");
        assert_eq!(config.operator_namespace, "openshift-network-operator");
        assert_eq!(config.host_mtu, 1500);
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.metrics_port, 8081);
        assert_eq!(config.requeue_interval(), Duration::from_secs(180));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_release() {
        let mut config = parse(&["--release-version", ""]);
        assert_eq!(config.validate().unwrap_err(), "RELEASE_VERSION is required");

        config.release_version = Some("4.11.0".to_string());
        config.requeue_secs = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            "REQUEUE_SECS must be greater than 0"
        );
    }

    #[test]
    fn test_version_subcommand() {
        let config = parse(&["version"]);
        assert!(matches!(config.command, Some(Command::Version)));
    }
}
