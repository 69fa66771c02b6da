//! Keeps a Service in front of every managed Deployment.

use std::sync::Arc;

use autoexpose_k8s_utils::EventHandler;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, info, trace};

use crate::context::Context;
use crate::exposed::{available_replicas, desired_service, relabeled, selector_matches};
use crate::index::ExistingResourceIndex;
use crate::utils::namespace_of;
use crate::writer::ResourceWriter;
use crate::{Error, Result};

pub struct WorkloadReconciler<I: ExistingResourceIndex, W: ResourceWriter> {
    ctx: Arc<Context<I, W>>,
}

impl<I: ExistingResourceIndex, W: ResourceWriter> WorkloadReconciler<I, W> {
    pub fn new(ctx: Arc<Context<I, W>>) -> Self {
        Self { ctx }
    }

    async fn upsert(&self, previous: Option<&Deployment>, workload: &Deployment) -> Result<()> {
        if !self.ctx.policy.is_eligible(workload) {
            trace!("skipping unmanaged Deployment {}", workload.name_any());
            return Ok(());
        }
        let name = workload.name_any();
        let namespace = namespace_of(workload)?;

        // labels may have just changed, so the Service is found by the ones
        // it was created with
        let lookup = previous.unwrap_or(workload).labels();
        let services = self
            .ctx
            .index
            .list_services_by_labels(&namespace, lookup)?;

        if services.is_empty() {
            return self.create_service(workload, &namespace, &name).await;
        }

        let Some(previous) = previous else {
            debug!("Service for Deployment {}/{} already exists", namespace, name);
            return Ok(());
        };
        if previous.resource_version() == workload.resource_version() {
            return Ok(());
        }

        let labels = workload.labels();
        for service in services.iter().filter(|svc| !selector_matches(svc, labels)) {
            self.ctx
                .writer
                .update_service(&relabeled(service, labels))
                .await?;
            info!(
                "updated labels of Service {}/{} for Deployment {}",
                namespace,
                service.name_any(),
                name
            );
        }
        Ok(())
    }

    async fn create_service(&self, workload: &Deployment, namespace: &str, name: &str) -> Result<()> {
        if available_replicas(workload) < 1 {
            debug!(
                "Deployment {}/{} has no available replicas, not creating a Service",
                namespace, name
            );
            return Ok(());
        }

        let service = desired_service(workload, &self.ctx.policy, &self.ctx.naming);
        match self.ctx.writer.create_service(&service).await {
            Ok(()) => info!(
                "created Service {}/{} for Deployment {}",
                namespace,
                service.name_any(),
                name
            ),
            Err(Error::AlreadyExists { .. }) => debug!(
                "Service {}/{} for Deployment {} already exists",
                namespace,
                service.name_any(),
                name
            ),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn delete(&self, workload: &Deployment) -> Result<()> {
        if !self.ctx.policy.is_eligible(workload) {
            return Ok(());
        }
        let name = workload.name_any();
        let namespace = namespace_of(workload)?;
        if workload.metadata.deletion_timestamp.is_some() {
            debug!("Deployment {}/{} is already being deleted", namespace, name);
            return Ok(());
        }

        let services = self
            .ctx
            .index
            .list_services_by_labels(&namespace, workload.labels())?;
        for service in services {
            let service_name = service.name_any();
            match self
                .ctx
                .writer
                .delete_service(&namespace, &service_name)
                .await
            {
                Ok(()) => info!(
                    "deleted Service {}/{} of Deployment {}",
                    namespace, service_name, name
                ),
                Err(Error::NotFound { .. }) => {
                    debug!("Service {}/{} is already gone", namespace, service_name)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<I: ExistingResourceIndex, W: ResourceWriter> EventHandler<Deployment>
    for WorkloadReconciler<I, W>
{
    type Error = Error;

    async fn on_add(&self, workload: Arc<Deployment>) -> Result<()> {
        debug!("Deployment {} was added", workload.name_any());
        self.upsert(None, &workload).await
    }

    async fn on_update(&self, old: Arc<Deployment>, new: Arc<Deployment>) -> Result<()> {
        debug!("Deployment {} was updated", new.name_any());
        self.upsert(Some(&old), &new).await
    }

    async fn on_delete(&self, workload: Arc<Deployment>) -> Result<()> {
        debug!("Deployment {} was deleted", workload.name_any());
        self.delete(&workload).await
    }
}
