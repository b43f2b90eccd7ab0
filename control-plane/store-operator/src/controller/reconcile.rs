//! One reconciliation pass for one Store.
//!
//! Every pass starts from a fresh read of the Store and derives all work
//! from its persisted spec, finalizers and status. Waiting is expressed as
//! a requeue, never by blocking inside the pass.

use std::collections::BTreeMap;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use super::events::LifecycleEvent;
use super::status::{
    REASON_HELM_ERROR, REASON_PROVISIONING, REASON_WAITING_FOR_PODS,
    transition,
};
use super::{Context, ReconcileError};
use crate::credentials::ensure_credentials;
use crate::crd::{STORE_FINALIZER, Store, StorePhase, StoreStatus};
use crate::deployer::WordPressValues;
use crate::guardrails::apply_guardrails;
use crate::readiness::workload_ready;
use crate::store::{ResourceStore, StoreError};
use crate::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, STORE_LABEL};

const NAMESPACE_PREFIX: &str = "store-";

/// Namespace that hosts a store's workload.
pub fn target_namespace(store_name: &str) -> String {
    format!("{NAMESPACE_PREFIX}{store_name}")
}

fn is_terminating(ns: &Namespace) -> bool {
    ns.metadata.deletion_timestamp.is_some()
        || ns.status.as_ref().and_then(|s| s.phase.as_deref())
            == Some("Terminating")
}

/// Reconcile the Store `ns/name`. A Store that no longer exists is done.
#[instrument(skip(ctx), fields(phase = tracing::field::Empty))]
pub async fn reconcile_store<R: ResourceStore>(
    ctx: &Context<R>,
    ns: &str,
    name: &str,
) -> Result<Action, ReconcileError> {
    let Some(store) = ctx.store.get::<Store>(Some(ns), name).await? else {
        debug!("store is gone");
        return Ok(Action::await_change());
    };
    tracing::Span::current().record(
        "phase",
        store.phase().map(|p| p.as_str()).unwrap_or("New"),
    );
    if store.is_deleting() {
        finalize(ctx, ns, store).await
    } else {
        apply(ctx, ns, store).await
    }
}

/// Deletion branch. The finalizer stays until the target namespace reads
/// as absent; any error on the way leaves it in place.
async fn finalize<R: ResourceStore>(
    ctx: &Context<R>,
    ns: &str,
    store: Store,
) -> Result<Action, ReconcileError> {
    if !store.has_finalizer() {
        return Ok(Action::await_change());
    }
    let name = store.name_unchecked();
    let target = target_namespace(&name);
    let timing = &ctx.cfg.timing;

    if let Err(e) = ctx.deployer.uninstall(&name, &target).await {
        warn!(error = %e, "uninstall failed");
        ctx.sink
            .record(
                &store,
                LifecycleEvent::DeleteFailed {
                    message: e.to_string(),
                },
            )
            .await;
        return Ok(Action::requeue(timing.helm_retry.into()));
    }

    // Best effort: claims are reclaimed with the namespace regardless.
    let in_target = Some(target.as_str());
    match ctx.store.list::<PersistentVolumeClaim>(in_target, "").await {
        Ok(claims) => {
            for claim in claims {
                let claim_name = claim.metadata.name.unwrap_or_default();
                if let Err(e) = ctx
                    .store
                    .delete::<PersistentVolumeClaim>(in_target, &claim_name)
                    .await
                {
                    debug!(claim = %claim_name, error = %e, "delete failed");
                }
            }
        }
        Err(e) => debug!(error = %e, "listing claims failed"),
    }

    // Transient read errors propagate: the finalizer must not be removed
    // on anything but an explicit not-found.
    if let Some(existing) = ctx.store.get::<Namespace>(None, &target).await? {
        if !is_terminating(&existing) {
            ctx.store.delete::<Namespace>(None, &target).await?;
            info!(namespace = %target, "target namespace deletion requested");
        } else {
            debug!(namespace = %target, "target namespace still terminating");
        }
        return Ok(Action::requeue(timing.deletion_requeue.into()));
    }

    let mut updated = store.clone();
    if let Some(f) = updated.metadata.finalizers.as_mut() {
        f.retain(|x| x != STORE_FINALIZER);
    }
    ctx.store.replace(Some(ns), &updated).await?;
    info!("teardown complete, finalizer removed");
    ctx.sink.record(&store, LifecycleEvent::Deleted).await;
    Ok(Action::await_change())
}

/// Create/update branch.
async fn apply<R: ResourceStore>(
    ctx: &Context<R>,
    ns: &str,
    mut store: Store,
) -> Result<Action, ReconcileError> {
    let timing = &ctx.cfg.timing;
    let name = store.name_unchecked();

    if !store.has_finalizer() {
        store
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(STORE_FINALIZER.to_string());
        ctx.store.replace(Some(ns), &store).await?;
        debug!("finalizer added");
        return Ok(Action::requeue(timing.finalizer_requeue.into()));
    }

    let target = target_namespace(&name);
    match ctx.store.get::<Namespace>(None, &target).await? {
        None => {
            create_namespace(ctx, &target, &name).await?;
            return Ok(Action::requeue(timing.namespace_requeue.into()));
        }
        Some(existing) if is_terminating(&existing) => {
            // Left over from an earlier Store with the same name.
            info!(namespace = %target, "previous namespace still terminating");
            return Ok(Action::requeue(timing.namespace_requeue.into()));
        }
        Some(_) => {}
    }

    let creds = ensure_credentials(&ctx.store, &store).await?;

    let plan = ctx.plans.resolve(&store.spec.plan);
    if plan.defaulted {
        warn!(
            requested = %store.spec.plan,
            applied = %plan.name,
            "unknown plan, using default"
        );
    }
    apply_guardrails(
        &ctx.store,
        &target,
        &plan,
        &ctx.cfg.network.ingress_namespace,
    )
    .await?;

    let template = ctx
        .cfg
        .template_for(&store.spec.engine)
        .ok_or_else(|| {
            ReconcileError::MissingTemplate(store.spec.engine.clone())
        })?
        .to_string();
    let values = WordPressValues::build(&name, &creds, &ctx.cfg).to_tree()?;

    let mut status = store.status.clone().unwrap_or_default();

    if status.phase.is_none() {
        transition(
            &mut status,
            StorePhase::Provisioning,
            Some(REASON_PROVISIONING),
            Some("Provisioning started".into()),
        );
        store = write_status(ctx, ns, store, &status).await?;
        ctx.sink
            .record(&store, LifecycleEvent::ProvisioningStarted)
            .await;
    }

    let generation = store.metadata.generation;
    let deployed_current = status.observed_generation == generation
        && status.phase == Some(StorePhase::Ready);
    if !deployed_current {
        if plan.defaulted {
            ctx.sink
                .record(
                    &store,
                    LifecycleEvent::PlanDefaulted {
                        requested: store.spec.plan.clone(),
                        applied: plan.name.clone(),
                    },
                )
                .await;
        }
        info!(release = %name, namespace = %target, ?generation, "deploying");
        match ctx
            .deployer
            .install_or_upgrade(&name, &target, &template, &values)
            .await
        {
            Ok(()) => {
                status.observed_generation = generation;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "deployment failed");
                transition(
                    &mut status,
                    StorePhase::Failed,
                    Some(REASON_HELM_ERROR),
                    Some(message.clone()),
                );
                let store = write_status(ctx, ns, store, &status).await?;
                ctx.sink
                    .record(&store, LifecycleEvent::DeployFailed { message })
                    .await;
                return Ok(Action::requeue(timing.helm_retry.into()));
            }
        }
    }

    // Leaving Ready here means the gate above redeploys on the next poll
    // until the pods come up.
    if !workload_ready(&ctx.store, &target).await {
        transition(
            &mut status,
            StorePhase::Provisioning,
            Some(REASON_WAITING_FOR_PODS),
            Some("Waiting for pods".into()),
        );
        write_status(ctx, ns, store, &status).await?;
        return Ok(Action::requeue(timing.pod_check.into()));
    }

    if status.phase != Some(StorePhase::Ready) {
        transition(&mut status, StorePhase::Ready, None, None);
        status.url = Some(ctx.cfg.store_url(&name));
        let store = write_status(ctx, ns, store, &status).await?;
        let elapsed = store
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(|t| (Utc::now() - t.0).to_std().ok());
        info!(url = ?status.url, "store is ready");
        ctx.sink
            .record(&store, LifecycleEvent::Ready { elapsed })
            .await;
    } else {
        write_status(ctx, ns, store, &status).await?;
    }
    Ok(Action::requeue(timing.resync.into()))
}

async fn create_namespace<R: ResourceStore>(
    ctx: &Context<R>,
    target: &str,
    store_name: &str,
) -> Result<(), ReconcileError> {
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(target.to_string()),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                (STORE_LABEL.to_string(), store_name.to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    };
    match ctx.store.create(None, &ns).await {
        Ok(_) => {
            info!(namespace = %target, "target namespace created");
            Ok(())
        }
        Err(StoreError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Persist `status` if it differs from what the Store carries. Returns the
/// Store as last written so later writes use its resourceVersion.
async fn write_status<R: ResourceStore>(
    ctx: &Context<R>,
    ns: &str,
    mut store: Store,
    status: &StoreStatus,
) -> Result<Store, ReconcileError> {
    if store.status.as_ref() == Some(status) {
        return Ok(store);
    }
    store.status = Some(status.clone());
    let written = ctx.store.replace_status(Some(ns), &store).await?;
    debug!(phase = ?status.phase, reason = ?status.reason, "status written");
    Ok(written)
}
