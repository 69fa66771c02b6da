use std::future::Future;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::error::WriteOp;
use crate::route::{BackendPatch, patched_rules};
use crate::{Error, Result};

const MANAGER: &str = "autoexpose-controller";
const SERVICE_KIND: &str = "Service";
const ROUTE_KIND: &str = "Ingress";

/// Executes derived writes against the cluster.
///
/// Create calls report an existing object as [`Error::AlreadyExists`] and
/// delete calls report a missing one as [`Error::NotFound`], so callers can
/// tell those outcomes apart from real failures.
pub trait ResourceWriter: Send + Sync {
    fn create_service(&self, service: &Service) -> impl Future<Output = Result<()>> + Send;

    fn update_service(&self, service: &Service) -> impl Future<Output = Result<()>> + Send;

    fn delete_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_route(&self, route: &Ingress) -> impl Future<Output = Result<()>> + Send;

    /// Rewrites the backend of the single path of `route`.
    fn patch_route(
        &self,
        route: &Ingress,
        patch: &BackendPatch,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_route(&self, namespace: &str, name: &str)
    -> impl Future<Output = Result<()>> + Send;
}

#[derive(Clone)]
pub struct KubeWriter {
    client: Client,
}

impl KubeWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn routes(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ResourceWriter for KubeWriter {
    async fn create_service(&self, service: &Service) -> Result<()> {
        let (namespace, name) = namespaced_name(service)?;
        self.services(&namespace)
            .create(&PostParams::default(), service)
            .await
            .map_err(|e| write_error(WriteOp::Create, SERVICE_KIND, &namespace, &name, e))?;
        debug!("created Service {}/{}", namespace, name);
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        let (namespace, name) = namespaced_name(service)?;
        self.services(&namespace)
            .replace(&name, &PostParams::default(), service)
            .await
            .map_err(|e| write_error(WriteOp::Update, SERVICE_KIND, &namespace, &name, e))?;
        debug!("updated Service {}/{}", namespace, name);
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.services(namespace)
            .delete(name, &DeleteParams::foreground())
            .await
            .map_err(|e| write_error(WriteOp::Delete, SERVICE_KIND, namespace, name, e))?;
        debug!("deleted Service {}/{}", namespace, name);
        Ok(())
    }

    async fn create_route(&self, route: &Ingress) -> Result<()> {
        let (namespace, name) = namespaced_name(route)?;
        self.routes(&namespace)
            .create(&PostParams::default(), route)
            .await
            .map_err(|e| write_error(WriteOp::Create, ROUTE_KIND, &namespace, &name, e))?;
        debug!("created Ingress {}/{}", namespace, name);
        Ok(())
    }

    async fn patch_route(&self, route: &Ingress, patch: &BackendPatch) -> Result<()> {
        let (namespace, name) = namespaced_name(route)?;
        // rules is an atomic list, so the whole list goes out with only the
        // backend changed
        let rules = patched_rules(route, patch)?;
        let body = json!({ "spec": { "rules": rules } });
        let params = PatchParams {
            field_manager: Some(MANAGER.into()),
            ..Default::default()
        };
        self.routes(&namespace)
            .patch(&name, &params, &Patch::Merge(&body))
            .await
            .map_err(|e| write_error(WriteOp::Patch, ROUTE_KIND, &namespace, &name, e))?;
        debug!("patched Ingress {}/{} with {:?}", namespace, name, patch);
        Ok(())
    }

    async fn delete_route(&self, namespace: &str, name: &str) -> Result<()> {
        self.routes(namespace)
            .delete(name, &DeleteParams::foreground())
            .await
            .map_err(|e| write_error(WriteOp::Delete, ROUTE_KIND, namespace, name, e))?;
        debug!("deleted Ingress {}/{}", namespace, name);
        Ok(())
    }
}

fn namespaced_name<K: ResourceExt>(resource: &K) -> Result<(String, String)> {
    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .ok_or_else(|| Error::InvalidResource(format!("{name} has no namespace")))?;
    Ok((namespace, name))
}

fn write_error(
    op: WriteOp,
    kind: &'static str,
    namespace: &str,
    name: &str,
    source: kube::Error,
) -> Error {
    match &source {
        kube::Error::Api(ae) if op == WriteOp::Create && ae.code == 409 => Error::AlreadyExists {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        },
        kube::Error::Api(ae) if op == WriteOp::Delete && ae.code == 404 => Error::NotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        },
        _ => Error::Write {
            op,
            kind,
            namespace: namespace.into(),
            name: name.into(),
            source,
        },
    }
}
