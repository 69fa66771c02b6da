use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use kube::core::{Expression, Selector, SelectorExt};
use kube::runtime::reflector::Store;

use crate::route::targets_service;
use crate::{Error, Result};

/// Read-only view over Services and Ingresses that already exist.
///
/// Backed by a locally synchronised cache, so answers may lag the cluster.
pub trait ExistingResourceIndex: Send + Sync {
    /// Services in `namespace` whose labels contain every pair of `labels`.
    fn list_services_by_labels(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Arc<Service>>>;

    fn list_routes_by_namespace(&self, namespace: &str) -> Vec<Arc<Ingress>>;

    /// Ingresses in `namespace` with a path routing to `service_name`.
    fn routes_for_service(&self, namespace: &str, service_name: &str) -> Vec<Arc<Ingress>> {
        self.list_routes_by_namespace(namespace)
            .into_iter()
            .filter(|route| targets_service(route, service_name))
            .collect()
    }
}

#[derive(Clone)]
pub struct StoreIndex {
    services: Store<Service>,
    routes: Store<Ingress>,
}

impl StoreIndex {
    pub fn new(services: Store<Service>, routes: Store<Ingress>) -> Self {
        Self { services, routes }
    }
}

impl ExistingResourceIndex for StoreIndex {
    fn list_services_by_labels(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Arc<Service>>> {
        let selector = label_selector(labels)?;
        Ok(self
            .services
            .state()
            .into_iter()
            .filter(|svc| {
                svc.namespace().as_deref() == Some(namespace) && selector.matches(svc.labels())
            })
            .collect())
    }

    fn list_routes_by_namespace(&self, namespace: &str) -> Vec<Arc<Ingress>> {
        self.routes
            .state()
            .into_iter()
            .filter(|route| route.namespace().as_deref() == Some(namespace))
            .collect()
    }
}

/// An empty label set would select every Service in the namespace, so it is
/// rejected.
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> Result<Selector> {
    if labels.is_empty() {
        return Err(Error::InvalidArgument(
            "label set for a service lookup must not be empty".into(),
        ));
    }
    Ok(labels
        .iter()
        .map(|(k, v)| Expression::Equal(k.clone(), v.clone()))
        .collect())
}
