use std::sync::Arc;

use autoexpose_k8s_utils::{Informer, InformerConfig, wait_for_sync};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher;
use kube::{Api, Client};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::context::Context;
use crate::index::StoreIndex;
use crate::ingress::RouteObserver;
use crate::metrics::{ControllerMetrics, Measured};
use crate::service::ServiceReconciler;
use crate::workload::WorkloadReconciler;
use crate::writer::KubeWriter;
use crate::{Error, Result};

type InformerResult = std::result::Result<autoexpose_k8s_utils::Result<()>, JoinError>;

/// Runs the Deployment, Service and Ingress informers until `cancel` fires or
/// one of them fails. `ready` is cancelled once all three caches have synced.
pub async fn start_engine(
    client: Client,
    config: Config,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let informer_config = InformerConfig {
        resync: config.resync,
        watcher: watcher::Config::default(),
    };
    let workloads = Informer::new(Api::<Deployment>::all(client.clone()), informer_config.clone());
    let services = Informer::new(Api::<Service>::all(client.clone()), informer_config.clone());
    let routes = Informer::new(Api::<Ingress>::all(client.clone()), informer_config);
    let synced = [workloads.synced(), services.synced(), routes.synced()];

    let index = StoreIndex::new(services.reader(), routes.reader());
    let ctx = Arc::new(Context::new(&config, index, KubeWriter::new(client)));

    // stops the informers on a failure without touching the caller's token
    let engine = cancel.child_token();
    let mut tasks = JoinSet::new();
    tasks.spawn(workloads.run(
        Measured::new(
            WorkloadReconciler::new(ctx.clone()),
            ControllerMetrics::new("workload"),
        ),
        engine.clone(),
    ));
    tasks.spawn(services.run(
        Measured::new(
            ServiceReconciler::new(ctx.clone()),
            ControllerMetrics::new("service"),
        ),
        engine.clone(),
    ));
    tasks.spawn(routes.run(
        Measured::new(
            RouteObserver::new(ctx.policy.clone()),
            ControllerMetrics::new("route"),
        ),
        engine.clone(),
    ));
    info!("started autoexpose engine");

    let startup: Option<Result<()>> = tokio::select! {
        res = wait_for_sync(&synced, config.sync_timeout) => res.err().map(|e| Err(e.into())),
        Some(res) = tasks.join_next() => Some(flatten(res)),
        _ = cancel.cancelled() => Some(Ok(())),
    };
    if let Some(result) = startup {
        engine.cancel();
        drain(&mut tasks).await;
        return result;
    }
    ready.cancel();
    info!("caches synced, autoexpose engine is ready");

    let result = match tasks.join_next().await {
        Some(res) => flatten(res),
        None => Ok(()),
    };
    engine.cancel();
    drain(&mut tasks).await;
    result
}

fn flatten(res: InformerResult) -> Result<()> {
    match res {
        Ok(inner) => inner.map_err(Error::from),
        Err(e) => Err(Error::Task(e.to_string())),
    }
}

async fn drain(tasks: &mut JoinSet<autoexpose_k8s_utils::Result<()>>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = flatten(res) {
            error!("informer exited with error: {}", e);
        }
    }
}
