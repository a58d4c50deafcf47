//! Prometheus metrics for the cnro operator.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::bootstrap::ClusterSnapshot;
use crate::rollout::RolloutDecision;

/// Labels for reconcile metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub network: String,
    pub result: String,
}

/// Labels for per-network metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NetworkLabels {
    pub network: String,
}

/// Labels for decision gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TierLabels {
    pub network: String,
    pub tier: String,
}

/// All Prometheus metrics for the operator.
pub struct Metrics {
    pub reconcile_total: Family<ReconcileLabels, Counter>,
    pub reconcile_duration_seconds: Family<NetworkLabels, Histogram>,
    pub discovery_timeouts_total: Family<NetworkLabels, Counter>,
    pub discovery_deadline_seconds: Family<NetworkLabels, Gauge>,
    pub control_plane_members: Family<NetworkLabels, Gauge>,
    pub rollout_decision: Family<TierLabels, Gauge>,
}

/// Reconcile passes include the discovery poll, which can take minutes.
const RECONCILE_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 130.0, 250.0, 300.0,
];

impl Metrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let reconcile_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "cnro_reconcile",
            "Total number of reconcile calls",
            reconcile_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<NetworkLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(RECONCILE_BUCKETS.iter().copied())
            });
        registry.register(
            "cnro_reconcile_duration_seconds",
            "Duration of reconcile calls in seconds",
            reconcile_duration_seconds.clone(),
        );

        let discovery_timeouts_total = Family::<NetworkLabels, Counter>::default();
        registry.register(
            "cnro_discovery_timeouts",
            "Total number of control plane discoveries that hit their deadline",
            discovery_timeouts_total.clone(),
        );

        let discovery_deadline_seconds = Family::<NetworkLabels, Gauge>::default();
        registry.register(
            "cnro_discovery_deadline_seconds",
            "Deadline the next control plane discovery will use",
            discovery_deadline_seconds.clone(),
        );

        let control_plane_members = Family::<NetworkLabels, Gauge>::default();
        registry.register(
            "cnro_control_plane_members",
            "Control plane members found by the last discovery",
            control_plane_members.clone(),
        );

        let rollout_decision = Family::<TierLabels, Gauge>::default();
        registry.register(
            "cnro_rollout_decision",
            "Last rollout decision per tier (1=update, 0=hold)",
            rollout_decision.clone(),
        );

        Self {
            reconcile_total,
            reconcile_duration_seconds,
            discovery_timeouts_total,
            discovery_deadline_seconds,
            control_plane_members,
            rollout_decision,
        }
    }

    pub fn record_reconcile(&self, network: &str, result: &str, elapsed: Duration) {
        self.reconcile_total
            .get_or_create(&ReconcileLabels {
                network: network.to_string(),
                result: result.to_string(),
            })
            .inc();
        self.reconcile_duration_seconds
            .get_or_create(&NetworkLabels {
                network: network.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    /// Record the bootstrap outcome and the deadline the next pass will use.
    pub fn record_bootstrap(&self, network: &str, snapshot: &ClusterSnapshot, next_deadline: Duration) {
        let labels = NetworkLabels {
            network: network.to_string(),
        };
        if snapshot.discovery_timed_out {
            self.discovery_timeouts_total.get_or_create(&labels).inc();
        }
        self.discovery_deadline_seconds
            .get_or_create(&labels)
            .set(i64::try_from(next_deadline.as_secs()).unwrap_or(i64::MAX));
        self.control_plane_members
            .get_or_create(&labels)
            .set(i64::try_from(snapshot.master_addresses.len()).unwrap_or(i64::MAX));
    }

    pub fn record_decision(&self, network: &str, decision: &RolloutDecision) {
        for (tier, update) in [
            ("master", decision.update_master),
            ("node", decision.update_node),
            ("prepull", decision.render_prepull),
        ] {
            self.rollout_decision
                .get_or_create(&TierLabels {
                    network: network.to_string(),
                    tier: tier.to_string(),
                })
                .set(i64::from(update));
        }
    }
}

/// Axum handler that encodes the registry as OpenMetrics text.
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut buf = String::new();
    if encode(&mut buf, &registry).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics".to_string(),
        );
    }
    (StatusCode::OK, buf)
}

/// Start the metrics server on the given port.
pub async fn serve(port: u16, registry: Arc<Registry>) -> anyhow::Result<()> {
    use axum::Router;
    use axum::routing::get;
    use tokio::net::TcpListener;
    use tracing::info;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("Metrics server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(registry: &Registry) -> String {
        let mut buf = String::new();
        encode(&mut buf, registry).unwrap();
        buf
    }

    #[test]
    fn test_reconcile_metrics() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics.record_reconcile("cluster", "success", Duration::from_millis(42));
        metrics.record_reconcile("cluster", "error", Duration::from_secs(1));

        let buf = encoded(&registry);
        assert!(buf.contains(r#"cnro_reconcile_total{network="cluster",result="success"} 1"#));
        assert!(buf.contains(r#"cnro_reconcile_total{network="cluster",result="error"} 1"#));
        assert!(buf.contains("cnro_reconcile_duration_seconds_bucket{"));
        assert!(buf.contains("# TYPE cnro_reconcile counter"));
    }

    #[test]
    fn test_bootstrap_metrics() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        let snapshot = ClusterSnapshot {
            master_addresses: vec!["10.0.0.1".into()],
            discovery_timed_out: true,
            ..Default::default()
        };
        metrics.record_bootstrap("cluster", &snapshot, Duration::from_secs(130));

        let buf = encoded(&registry);
        assert!(buf.contains(r#"cnro_discovery_timeouts_total{network="cluster"} 1"#));
        assert!(buf.contains(r#"cnro_discovery_deadline_seconds{network="cluster"} 130"#));
        assert!(buf.contains(r#"cnro_control_plane_members{network="cluster"} 1"#));
    }

    #[test]
    fn test_decision_gauges() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics.record_decision(
            "cluster",
            &RolloutDecision {
                update_master: false,
                update_node: true,
                render_prepull: false,
            },
        );

        let buf = encoded(&registry);
        assert!(buf.contains(r#"cnro_rollout_decision{network="cluster",tier="master"} 0"#));
        assert!(buf.contains(r#"cnro_rollout_decision{network="cluster",tier="node"} 1"#));
        assert!(buf.contains(r#"cnro_rollout_decision{network="cluster",tier="prepull"} 0"#));
        assert!(buf.ends_with("# EOF\n"));
    }
}
