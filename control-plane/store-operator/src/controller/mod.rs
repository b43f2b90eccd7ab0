pub mod events;
pub mod metrics;
mod reconcile;
pub mod status;


use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client, ResourceExt};
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::credentials::CredentialError;
use crate::crd::Store;
use crate::deployer::{HelmDeployer, WorkloadDeployer};
use crate::plans::PlanCatalog;
use crate::store::{KubeResourceStore, ResourceStore, StoreError};

pub use events::{KubeSink, LifecycleEvent, LifecycleSink};
pub use metrics::StoreMetrics;
pub use reconcile::{reconcile_store, target_namespace};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Configuration the controller cannot route around.
    #[error("no template configured for engine {0:?}")]
    MissingTemplate(String),

    #[error("store {0} has no namespace")]
    MissingNamespace(String),

    #[error("failed to build deployer values: {0}")]
    Values(#[from] serde_json::Error),
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_conflict(),
            ReconcileError::Credentials(CredentialError::Store(e)) => {
                e.is_conflict()
            }
            _ => false,
        }
    }
}

/// Everything a reconciliation pass needs. Holds no per-store state.
pub struct Context<R> {
    pub store: R,
    pub deployer: Arc<dyn WorkloadDeployer>,
    pub sink: Arc<dyn LifecycleSink>,
    pub cfg: OperatorConfig,
    pub plans: PlanCatalog,
}

async fn reconcile<R: ResourceStore>(
    obj: Arc<Store>,
    ctx: Arc<Context<R>>,
) -> Result<Action, ReconcileError> {
    let ns = obj
        .namespace()
        .ok_or_else(|| ReconcileError::MissingNamespace(obj.name_any()))?;
    reconcile_store(&ctx, &ns, &obj.name_any()).await
}

pub fn error_policy<R>(
    obj: Arc<Store>,
    err: &ReconcileError,
    ctx: Arc<Context<R>>,
) -> Action {
    if err.is_conflict() {
        info!(name = %obj.name_any(), "version conflict, retrying");
        return Action::requeue(ctx.cfg.timing.conflict_requeue.into());
    }
    warn!(name = %obj.name_any(), error = %err, "reconcile failed");
    Action::requeue(ctx.cfg.timing.error_requeue.into())
}

/// Watch Stores (and the credential Secrets they own) and reconcile until
/// the stream ends.
pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
    plans: PlanCatalog,
    sink: Arc<dyn LifecycleSink>,
) -> anyhow::Result<()> {
    let (stores, secrets): (Api<Store>, Api<Secret>) =
        match cfg.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };
    let ctx = Arc::new(Context {
        store: KubeResourceStore::new(client),
        deployer: Arc::new(HelmDeployer::new(&cfg.helm)),
        sink,
        cfg,
        plans,
    });

    info!("starting store controller");
    Controller::new(stores, watcher::Config::default())
        .owns(secrets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, ?action, "reconciled")
                }
                Err(e) => error!(error = %e, "reconcile error"),
            }
        })
        .await;
    Ok(())
}
