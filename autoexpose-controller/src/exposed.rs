//! Derivation of the Service exposing a workload.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::api::ObjectMeta;

use crate::naming::NameScheme;
use crate::policy::EligibilityPolicy;

const MAIN_CONTAINER: &str = "main";
const HTTP_PORT: &str = "http";
const SERVICE_TYPE: &str = "ClusterIP";
const SERVICE_PROTOCOL: &str = "TCP";
const EXTERNAL_ACCESS_DISABLED: &str = "false";

/// Builds the Service for a workload. Labels and selector mirror the workload
/// labels, the single port is the workload's HTTP container port.
pub fn desired_service(
    workload: &Deployment,
    policy: &EligibilityPolicy,
    naming: &NameScheme,
) -> Service {
    let name = naming.service_name(&workload.name_any());
    let port = http_container_port(workload);
    let labels = workload.labels().clone();

    // the opt-in travels with the Service so route derivation can see it
    let external_access = workload
        .annotations()
        .get(policy.external_access_annotation())
        .cloned()
        .unwrap_or_else(|| EXTERNAL_ACCESS_DISABLED.into());
    let annotations = BTreeMap::from([
        (
            policy.managed_by_annotation().to_string(),
            policy.managed_by_marker().to_string(),
        ),
        (
            policy.external_access_annotation().to_string(),
            external_access,
        ),
    ]);

    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: workload.namespace(),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(naming.port_name_for(&name)),
                protocol: Some(SERVICE_PROTOCOL.into()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            selector: Some(labels),
            type_: Some(SERVICE_TYPE.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy of `service` whose labels and selector are replaced by `labels`.
pub fn relabeled(service: &Service, labels: &BTreeMap<String, String>) -> Service {
    let mut service = service.clone();
    service.metadata.labels = Some(labels.clone());
    service.spec.get_or_insert_with(Default::default).selector = Some(labels.clone());
    service
}

pub fn selector_matches(service: &Service, labels: &BTreeMap<String, String>) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .is_some_and(|selector| selector == labels)
}

/// Port of the Service entry named after the Service, 0 when there is none.
pub fn service_port(service: &Service, naming: &NameScheme) -> i32 {
    let port_name = naming.port_name_for(&service.name_any());
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| {
            ports
                .iter()
                .find(|p| p.name.as_deref() == Some(port_name.as_str()))
        })
        .map(|p| p.port)
        .unwrap_or(0)
}

pub fn available_replicas(workload: &Deployment) -> i32 {
    workload
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}

/// Resolves the port a workload serves HTTP on. 0 when it cannot be told.
pub fn http_container_port(workload: &Deployment) -> i32 {
    let containers = workload
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .unwrap_or_default();

    select_container(containers)
        .map(container_http_port)
        .unwrap_or(0)
}

fn select_container(containers: &[Container]) -> Option<&Container> {
    match containers {
        [only] => Some(only),
        _ => containers.iter().find(|c| c.name == MAIN_CONTAINER),
    }
}

fn container_http_port(container: &Container) -> i32 {
    let ports = container.ports.as_deref().unwrap_or_default();
    match ports {
        [only] => only.container_port,
        _ => ports
            .iter()
            .find(|p| p.name.as_deref() == Some(HTTP_PORT))
            .map(|p| p.container_port)
            .unwrap_or(0),
    }
}
