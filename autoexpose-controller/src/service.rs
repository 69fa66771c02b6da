//! Keeps an Ingress in front of every managed Service that allows external
//! access.

use std::sync::Arc;

use autoexpose_k8s_utils::EventHandler;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info, trace};

use crate::context::Context;
use crate::exposed::service_port;
use crate::index::ExistingResourceIndex;
use crate::route::{Backend, BackendPatch, desired_route, generate_host};
use crate::utils::namespace_of;
use crate::writer::ResourceWriter;
use crate::{Error, Result};

pub struct ServiceReconciler<I: ExistingResourceIndex, W: ResourceWriter> {
    ctx: Arc<Context<I, W>>,
}

impl<I: ExistingResourceIndex, W: ResourceWriter> ServiceReconciler<I, W> {
    pub fn new(ctx: Arc<Context<I, W>>) -> Self {
        Self { ctx }
    }

    fn wants_route(&self, service: &Service) -> bool {
        self.ctx.policy.is_eligible(service)
            && self.ctx.policy.allows_external_access(service.annotations())
    }

    fn backend(&self, service: &Service) -> Backend {
        Backend {
            service_name: service.name_any(),
            port: service_port(service, &self.ctx.naming),
        }
    }

    async fn ensure_route(&self, service: &Service) -> Result<()> {
        let namespace = namespace_of(service)?;
        let backend = self.backend(service);
        if !self
            .ctx
            .index
            .routes_for_service(&namespace, &backend.service_name)
            .is_empty()
        {
            debug!(
                "Ingress for Service {}/{} already exists",
                namespace, backend.service_name
            );
            return Ok(());
        }
        self.create_route(namespace, backend).await
    }

    async fn create_route(&self, namespace: String, backend: Backend) -> Result<()> {
        let name = self.ctx.naming.route_name(&backend.service_name);
        let host = generate_host(&self.ctx.public_dns_domain);
        let route = desired_route(name.clone(), namespace.clone(), host.clone(), &backend);
        match self.ctx.writer.create_route(&route).await {
            Ok(()) => info!(
                "created Ingress {}/{} with host {} for Service {}",
                namespace, name, host, backend.service_name
            ),
            Err(Error::AlreadyExists { .. }) => {
                debug!("Ingress {}/{} already exists", namespace, name)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn update_route(&self, old: &Service, new: &Service) -> Result<()> {
        let namespace = namespace_of(new)?;
        let previous = self.backend(old);
        let current = self.backend(new);

        let routes = self
            .ctx
            .index
            .routes_for_service(&namespace, &previous.service_name);
        let Some(route) = routes.first() else {
            return self.create_route(namespace, current).await;
        };

        let patch = BackendPatch::between(&previous, &current);
        if patch.is_empty() {
            trace!("Ingress {}/{} is up to date", namespace, route.name_any());
            return Ok(());
        }
        self.ctx.writer.patch_route(route, &patch).await?;
        info!(
            "updated backend of Ingress {}/{} to {}:{}",
            namespace,
            route.name_any(),
            current.service_name,
            patch.port.unwrap_or(previous.port)
        );
        Ok(())
    }

    async fn delete_route(&self, service: &Service) -> Result<()> {
        let namespace = namespace_of(service)?;
        let name = self.ctx.naming.route_name(&service.name_any());
        match self.ctx.writer.delete_route(&namespace, &name).await {
            Ok(()) => info!(
                "deleted Ingress {}/{} of Service {}",
                namespace,
                name,
                service.name_any()
            ),
            Err(Error::NotFound { .. }) => debug!("Ingress {}/{} is already gone", namespace, name),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl<I: ExistingResourceIndex, W: ResourceWriter> EventHandler<Service> for ServiceReconciler<I, W> {
    type Error = Error;

    async fn on_add(&self, service: Arc<Service>) -> Result<()> {
        debug!("Service {} was added", service.name_any());
        if !self.wants_route(&service) {
            return Ok(());
        }
        self.ensure_route(&service).await
    }

    async fn on_update(&self, old: Arc<Service>, new: Arc<Service>) -> Result<()> {
        if Arc::ptr_eq(&old, &new) || old == new {
            return Ok(());
        }
        debug!("Service {} was updated", new.name_any());
        if !self.wants_route(&new) {
            return Ok(());
        }
        self.update_route(&old, &new).await
    }

    async fn on_delete(&self, service: Arc<Service>) -> Result<()> {
        debug!("Service {} was deleted", service.name_any());
        if !self.ctx.policy.is_eligible(service.as_ref()) {
            return Ok(());
        }
        self.delete_route(&service).await
    }
}
