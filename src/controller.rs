//! Network controller - reconcile pass and error policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{error, info, warn};

use crate::apply::{self, Applier, manifest};
use crate::bootstrap::{Bootstrapper, ClusterReader, ClusterSnapshot, NodeDirectory};
use crate::config::Config;
use crate::crd::{Network, NetworkSpec, RolloutStatus};
use crate::error::RolloutError;
use crate::k8s::{AnnotationStore, KubeCluster};
use crate::names::APPLIED_SPEC_ANNOTATION;
use crate::rollout::{self, IpFamilyMode, RolloutDecision};
use crate::state::StateStore;
use crate::status;
use crate::telemetry::metrics::Metrics;
use crate::validate;

/// Requeue delay after a transient failure.
const TRANSIENT_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue delay used by the controller error policy.
const ERROR_POLICY_REQUEUE: Duration = Duration::from_secs(30);

/// Shared context for the controller.
pub struct Context {
    pub kube_client: kube::Client,
    pub config: Config,
    pub bootstrapper: Bootstrapper,
    pub cluster: KubeCluster,
    pub applier: Applier,
    pub metrics: Arc<Metrics>,
}

/// Everything decided before anything is written to the cluster.
#[derive(Debug)]
pub struct Prepared {
    /// Spec with defaults filled in; persisted once applied.
    pub spec: NetworkSpec,
    pub family: IpFamilyMode,
    pub snapshot: ClusterSnapshot,
    pub decision: RolloutDecision,
}

/// Read the previously applied spec. A record that no longer parses is
/// treated as absent.
async fn applied_spec(store: &dyn StateStore) -> Result<Option<NetworkSpec>> {
    let Some(raw) = store.get(APPLIED_SPEC_ANNOTATION).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(spec) => Ok(Some(spec)),
        Err(e) => {
            warn!("Ignoring unparsable applied spec: {}", e);
            Ok(None)
        }
    }
}

/// Default and check the spec, bootstrap the cluster and decide the rollout.
#[allow(clippy::too_many_arguments)]
pub async fn prepare(
    target: &str,
    spec: &NetworkSpec,
    release: &str,
    host_mtu: u32,
    bootstrapper: &Bootstrapper,
    cluster: &dyn ClusterReader,
    directory: &dyn NodeDirectory,
    store: &dyn StateStore,
) -> Result<Prepared> {
    let previous = applied_spec(store).await?;

    let mut spec = spec.clone();
    validate::fill_defaults(&mut spec, previous.as_ref(), host_mtu);

    let mut errs = validate::validate(&spec);
    if let Some(prev) = &previous {
        errs.extend(validate::is_change_safe(prev, &spec));
    }
    if !errs.is_empty() {
        return Err(RolloutError::InvalidConfig(errs).into());
    }

    let snapshot = bootstrapper
        .bootstrap(target, &spec, cluster, directory, store)
        .await?;

    let family = IpFamilyMode::from_service_pools(spec.service_network.len());
    let decision = rollout::decide(&snapshot.tiers, family, release);

    Ok(Prepared {
        spec,
        family,
        snapshot,
        decision,
    })
}

/// Returns the remaining wait when the current generation was reconciled
/// successfully, recently enough that this pass only echoes our own status
/// write. A failed last pass never waits, so error requeues take effect.
fn recently_reconciled(
    status: &RolloutStatus,
    generation: i64,
    interval: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    // Failed passes leave a message; successful ones clear it.
    if status.observed_generation < generation || status.message.is_some() {
        return None;
    }
    let last = status.last_reconciled_at?;
    let elapsed = (now - last).to_std().unwrap_or_default();
    (elapsed < interval).then(|| interval - elapsed)
}

/// Render, plan and apply the datapath objects of a prepared pass.
async fn roll_out(ctx: &Context, prepared: &Prepared) -> Result<usize> {
    let release = ctx.config.release();
    let data = manifest::render_data(&prepared.spec, &prepared.snapshot, release);
    let mut objs = manifest::load_manifests(&ctx.config.manifest_dir, &data)?;
    apply::stamp(&mut objs, prepared.family, release);

    let live = ctx.applier.live_tiers(&prepared.decision).await?;
    let objs = apply::plan(objs, &prepared.decision, live);
    ctx.applier.apply(&objs).await
}

/// Reconcile the `Network` object.
pub async fn reconcile(obj: Arc<Network>, ctx: Arc<Context>) -> Result<Action, kube::Error> {
    let name = obj.name_any();
    let generation = obj.metadata.generation.unwrap_or(0);
    let current_status = obj.status.clone().unwrap_or_default();
    let requeue = ctx.config.requeue_interval();

    if let Some(wait) = recently_reconciled(&current_status, generation, requeue, Utc::now()) {
        return Ok(Action::requeue(wait));
    }

    info!("Reconciling {} (generation {})", name, generation);
    let started = Instant::now();

    let api: Api<Network> = Api::all(ctx.kube_client.clone());
    let store = AnnotationStore::new(ctx.kube_client.clone(), &name);
    let recorder = status::EventRecorder::new(ctx.kube_client.clone(), &obj);

    let mut new_status = current_status.clone();

    let result = async {
        let prepared = prepare(
            &name,
            &obj.spec,
            ctx.config.release(),
            ctx.config.host_mtu,
            &ctx.bootstrapper,
            &ctx.cluster,
            &ctx.cluster,
            &store,
        )
        .await?;
        ctx.metrics
            .record_bootstrap(&name, &prepared.snapshot, ctx.bootstrapper.deadline_for(&name));
        status::set_bootstrapped(&mut new_status, &prepared.snapshot, &prepared.spec);

        let applied = roll_out(&ctx, &prepared).await?;
        store
            .set(APPLIED_SPEC_ANNOTATION, &serde_json::to_string(&prepared.spec)?)
            .await?;
        Ok::<_, anyhow::Error>((prepared.decision, applied))
    }
    .await;

    match result {
        Ok((decision, applied)) => {
            ctx.metrics.record_decision(&name, &decision);
            new_status.observed_generation = generation;
            status::set_rolled_out(&mut new_status, decision, applied);

            if let Err(e) = status::patch_status(&api, &name, &new_status).await {
                warn!("Failed to patch status for {}: {}", name, e);
                ctx.metrics.record_reconcile(&name, "error", started.elapsed());
                return Ok(Action::requeue(Duration::from_secs(5)));
            }

            if current_status.decision != Some(decision) {
                recorder
                    .publish(
                        "RolloutDecision",
                        &format!(
                            "master={}, node={}, prepull={}",
                            decision.update_master, decision.update_node, decision.render_prepull
                        ),
                    )
                    .await;
            }
            ctx.metrics.record_reconcile(&name, "success", started.elapsed());
            Ok(Action::requeue(requeue))
        }
        Err(e) => {
            error!("Reconcile error for {}: {}", name, e);
            let rollout_err = e.downcast_ref::<RolloutError>();

            let action = match rollout_err {
                Some(RolloutError::InvalidConfig(errs)) => {
                    status::set_invalid(&mut new_status, errs);
                    recorder.publish_warning("InvalidConfig", &e.to_string()).await;
                    Action::requeue(requeue)
                }
                Some(err) if err.is_transient() => {
                    warn!("Transient error for {}, will retry: {}", name, e);
                    status::set_failed(&mut new_status, "TransientError", e.to_string());
                    Action::requeue(TRANSIENT_REQUEUE)
                }
                _ => {
                    status::set_failed(&mut new_status, "RolloutFailed", e.to_string());
                    recorder.publish_warning("RolloutFailed", &e.to_string()).await;
                    Action::requeue(requeue)
                }
            };

            if let Err(patch_err) = status::patch_status(&api, &name, &new_status).await {
                warn!("Failed to patch status for {}: {}", name, patch_err);
            }
            ctx.metrics.record_reconcile(&name, "error", started.elapsed());
            Ok(action)
        }
    }
}

/// Error policy for the controller.
pub fn error_policy(obj: Arc<Network>, err: &kube::Error, _ctx: Arc<Context>) -> Action {
    error!("Controller error for {}: {}", obj.name_any(), err);
    Action::requeue(ERROR_POLICY_REQUEUE)
}
