//! cnro - cluster network rollout operator.
//!
//! Watches the cluster `Network` resource, bootstraps the OVN-Kubernetes
//! control plane and sequences the master, node and pre-pull DaemonSet
//! rollouts across release upgrades and IP family conversions.

mod apply;
mod bootstrap;
mod config;
mod controller;
mod crd;
mod error;
mod k8s;
mod logging;
mod names;
mod rollout;
mod state;
mod status;
mod telemetry;
mod validate;

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::Api;
use kube::runtime::{Controller, watcher};
use tracing::{error, info};

use apply::Applier;
use bootstrap::Bootstrapper;
use config::{Command, Config};
use controller::Context;
use crd::Network;
use k8s::KubeCluster;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");
pub const RUSTC_VERSION: &str = env!("RUSTC_VERSION");

#[tokio::main]
async fn main() {
    let config = Config::from_args();

    if matches!(config.command, Some(Command::Version)) {
        println!("cnro {VERSION}");
        println!("  commit:     {COMMIT}");
        println!("  build date: {BUILD_DATE}");
        println!("  rustc:      {RUSTC_VERSION}");
        return;
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    logging::init(&config.log_format, &config.log_level);

    info!(
        "Starting cnro v{} (commit: {}, build: {}, release: {})",
        VERSION,
        COMMIT,
        BUILD_DATE,
        config.release()
    );

    if let Err(e) = run(config).await {
        error!("Operator failed: {}", e);
        std::process::exit(1);
    }
}

/// Main operator loop.
async fn run(config: Config) -> Result<()> {
    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let mut registry = prometheus_client::registry::Registry::default();
    let metrics = Arc::new(telemetry::metrics::Metrics::new(&mut registry));
    let registry = Arc::new(registry);

    let health_state = telemetry::health::HealthState::default();
    let health_port = config.health_port;
    let health_state_clone = health_state.clone();
    tokio::spawn(async move {
        if let Err(e) = telemetry::health::serve(health_port, health_state_clone).await {
            error!("Health server failed: {}", e);
        }
    });

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = telemetry::metrics::serve(metrics_port, registry).await {
            error!("Metrics server failed: {}", e);
        }
    });

    let api: Api<Network> = Api::all(client.clone());
    let watch = watcher::Config::default().fields(&format!("metadata.name={}", config.network_name));

    let ctx = Arc::new(Context {
        kube_client: client.clone(),
        bootstrapper: Bootstrapper::new(&config.datapath_namespace, &config.operator_namespace),
        cluster: KubeCluster::new(client.clone()),
        applier: Applier::new(client, &config.datapath_namespace),
        metrics,
        config,
    });

    health_state.set_ready(true);

    info!("Starting Network controller for {}", ctx.config.network_name);
    Controller::new(api, watch)
        .run(controller::reconcile, controller::error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled: {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    Ok(())
}
