use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::runtime::reflector::store;
use kube::runtime::watcher;

use crate::config::Config;
use crate::context::Context;
use crate::error::WriteOp;
use crate::index::StoreIndex;
use crate::route::BackendPatch;
use crate::writer::ResourceWriter;
use crate::{Error, Result};

pub(crate) const MANAGED_BY: &str = "autoexpose.dev/managed-by";
pub(crate) const EXTERNAL_ACCESS: &str = "autoexpose.dev/allow-internet-access";
pub(crate) const DOMAIN: &str = "apps.example.com";

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Intent {
    CreateService(Service),
    UpdateService(Service),
    DeleteService { namespace: String, name: String },
    CreateRoute(Ingress),
    PatchRoute { name: String, patch: BackendPatch },
    DeleteRoute { namespace: String, name: String },
}

/// Records every write. A second create of the same object answers
/// `AlreadyExists`, like the API server would.
#[derive(Default)]
pub(crate) struct RecordingWriter {
    intents: Mutex<Vec<Intent>>,
    created: Mutex<HashSet<String>>,
    fail: bool,
}

impl RecordingWriter {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn intents(&self) -> Vec<Intent> {
        self.intents.lock().unwrap().clone()
    }

    fn record(&self, intent: Intent) {
        self.intents.lock().unwrap().push(intent);
    }

    fn check(&self, op: WriteOp, kind: &'static str, namespace: &str, name: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Write {
                op,
                kind,
                namespace: namespace.into(),
                name: name.into(),
                source: kube::Error::Api(ErrorResponse {
                    status: "Failure".into(),
                    message: "injected".into(),
                    reason: "InternalError".into(),
                    code: 500,
                }),
            });
        }
        if op == WriteOp::Create
            && !self
                .created
                .lock()
                .unwrap()
                .insert(format!("{kind}/{namespace}/{name}"))
        {
            return Err(Error::AlreadyExists {
                kind,
                namespace: namespace.into(),
                name: name.into(),
            });
        }
        Ok(())
    }
}

impl ResourceWriter for RecordingWriter {
    async fn create_service(&self, service: &Service) -> Result<()> {
        self.record(Intent::CreateService(service.clone()));
        let namespace = service.namespace().unwrap_or_default();
        self.check(WriteOp::Create, "Service", &namespace, &service.name_any())
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        self.record(Intent::UpdateService(service.clone()));
        let namespace = service.namespace().unwrap_or_default();
        self.check(WriteOp::Update, "Service", &namespace, &service.name_any())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Intent::DeleteService {
            namespace: namespace.into(),
            name: name.into(),
        });
        self.check(WriteOp::Delete, "Service", namespace, name)
    }

    async fn create_route(&self, route: &Ingress) -> Result<()> {
        self.record(Intent::CreateRoute(route.clone()));
        let namespace = route.namespace().unwrap_or_default();
        self.check(WriteOp::Create, "Ingress", &namespace, &route.name_any())
    }

    async fn patch_route(&self, route: &Ingress, patch: &BackendPatch) -> Result<()> {
        self.record(Intent::PatchRoute {
            name: route.name_any(),
            patch: patch.clone(),
        });
        let namespace = route.namespace().unwrap_or_default();
        self.check(WriteOp::Patch, "Ingress", &namespace, &route.name_any())
    }

    async fn delete_route(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Intent::DeleteRoute {
            namespace: namespace.into(),
            name: name.into(),
        });
        self.check(WriteOp::Delete, "Ingress", namespace, name)
    }
}

pub(crate) fn config() -> Config {
    Config::new("marker", DOMAIN)
}

pub(crate) fn make_context(
    services: Vec<Service>,
    routes: Vec<Ingress>,
    writer: RecordingWriter,
) -> Arc<Context<StoreIndex, RecordingWriter>> {
    let (service_store, mut service_writer) = store();
    for svc in services {
        service_writer.apply_watcher_event(&watcher::Event::Apply(svc));
    }
    let (route_store, mut route_writer) = store();
    for route in routes {
        route_writer.apply_watcher_event(&watcher::Event::Apply(route));
    }
    let index = StoreIndex::new(service_store, route_store);
    Arc::new(Context::new(&config(), index, writer))
}

pub(crate) fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Managed Deployment with a single `main` container serving `http` on 8080.
pub(crate) fn workload(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(string_map(labels)),
            annotations: Some(string_map(&[(MANAGED_BY, "marker")])),
            resource_version: Some("1".into()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "main".into(),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".into()),
                            container_port: 8080,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            available_replicas: Some(1),
            ..Default::default()
        }),
    }
}

/// Managed Service with a single port named after it.
pub(crate) fn exposed_service(
    name: &str,
    namespace: &str,
    port_name: &str,
    port: i32,
    external: bool,
) -> Service {
    let external = if external { "true" } else { "false" };
    Service {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(string_map(&[("app", "web")])),
            annotations: Some(string_map(&[
                (MANAGED_BY, "marker"),
                (EXTERNAL_ACCESS, external),
            ])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(port_name.into()),
                port,
                ..Default::default()
            }]),
            selector: Some(string_map(&[("app", "web")])),
            ..Default::default()
        }),
        ..Default::default()
    }
}
