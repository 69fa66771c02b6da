use std::sync::Arc;

use autoexpose_k8s_utils::EventHandler;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::info;

use crate::policy::EligibilityPolicy;
use crate::route::route_backend;
use crate::{Error, Result};

/// Logs Ingress changes. Ingresses are only written by the Service
/// reconciler, never in reaction to their own events.
pub struct RouteObserver {
    policy: EligibilityPolicy,
}

impl RouteObserver {
    pub fn new(policy: EligibilityPolicy) -> Self {
        Self { policy }
    }

    fn observe(&self, action: &str, route: &Ingress) {
        let namespace = route.namespace().unwrap_or_default();
        if self.policy.is_excluded(&namespace) {
            return;
        }
        match route_backend(route) {
            Some(backend) => info!(
                "Ingress {}/{} was {} with backend {}:{}",
                namespace,
                route.name_any(),
                action,
                backend.service_name,
                backend.port
            ),
            None => info!("Ingress {}/{} was {}", namespace, route.name_any(), action),
        }
    }
}

impl EventHandler<Ingress> for RouteObserver {
    type Error = Error;

    async fn on_add(&self, route: Arc<Ingress>) -> Result<()> {
        self.observe("added", &route);
        Ok(())
    }

    async fn on_update(&self, old: Arc<Ingress>, new: Arc<Ingress>) -> Result<()> {
        if old.resource_version() != new.resource_version() {
            self.observe("updated", &new);
        }
        Ok(())
    }

    async fn on_delete(&self, route: Arc<Ingress>) -> Result<()> {
        self.observe("deleted", &route);
        Ok(())
    }
}
