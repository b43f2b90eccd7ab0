use std::net::SocketAddr;
use std::sync::Arc;

use kube::Client;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    config::OperatorConfig,
    controller::{KubeSink, StoreMetrics, run_controller},
    plans::PlanCatalog,
    web::{HealthState, run_http_server},
};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &OperatorConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Spawn the Store controller loop. Readiness is reported once the loop
/// has been set up and cleared when it exits.
pub fn spawn_controller(
    client: Client,
    cfg: OperatorConfig,
    plans: PlanCatalog,
    health: HealthState,
) -> JoinHandle<anyhow::Result<()>> {
    let sink = Arc::new(KubeSink::new(client.clone(), StoreMetrics::new()));
    tokio::spawn(async move {
        health.set_ready(true);
        let res = run_controller(client, cfg, plans, sink).await;
        health.set_ready(false);
        res
    })
}

/// Spawn the health endpoint server.
pub fn spawn_http(
    addr: SocketAddr,
    health: HealthState,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_http_server(addr, health).await })
}

/// Start the controller and the HTTP server; returns when either stops.
pub async fn run_all(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let http_addr = compute_http_addr(&cfg);
    let health = HealthState::default();
    // Malformed overrides fail startup rather than the first pass.
    let plans = PlanCatalog::with_overrides(cfg.plan_overrides.as_deref())?;
    info!(plans = ?plans.names().collect::<Vec<_>>(), "plan catalog loaded");

    let controller = spawn_controller(client, cfg, plans, health.clone());
    let http = spawn_http(http_addr, health);

    until_first_exit(controller, http).await
}

/// Wait for either task to finish and abort the other. The controller
/// stops on SIGTERM/SIGINT, and the HTTP server must not outlive it.
async fn until_first_exit(
    mut controller: JoinHandle<anyhow::Result<()>>,
    mut http: JoinHandle<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        res = &mut controller => {
            http.abort();
            info!("controller stopped, shutting down HTTP server");
            res?
        }
        res = &mut http => {
            controller.abort();
            warn!("HTTP server stopped, shutting down controller");
            res?
        }
    }
}
