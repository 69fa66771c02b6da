//! Derivation and patching of the Ingress routing to a Service.
//!
//! A managed Ingress holds exactly one rule with exactly one path for its
//! whole lifetime. Patches only ever rewrite the backend of that path.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use rand::Rng;

use crate::{Error, Result};

const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";
const ROUTE_PATH: &str = "/";
const ROUTE_PATH_TYPE: &str = "Prefix";
const HOST_RANDOM_BYTES: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    pub service_name: String,
    pub port: i32,
}

/// Partial backend update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendPatch {
    pub service_name: Option<String>,
    pub port: Option<i32>,
}

impl BackendPatch {
    /// Compares a Service before and after an update. A new port of 0 means
    /// the port could not be resolved and never replaces the current one.
    pub fn between(old: &Backend, new: &Backend) -> Self {
        let service_name =
            (old.service_name != new.service_name).then(|| new.service_name.clone());
        let port = (old.port != new.port && new.port != 0).then_some(new.port);
        Self { service_name, port }
    }

    pub fn is_empty(&self) -> bool {
        self.service_name.is_none() && self.port.is_none()
    }
}

pub fn desired_route(name: String, namespace: String, host: String, backend: &Backend) -> Ingress {
    let annotations = BTreeMap::from([(REWRITE_TARGET_ANNOTATION.to_string(), ROUTE_PATH.to_string())]);
    Ingress {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(ROUTE_PATH.into()),
                        path_type: ROUTE_PATH_TYPE.into(),
                        backend: service_backend(backend),
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// True when any path of the Ingress routes to `service_name`.
pub fn targets_service(route: &Ingress, service_name: &str) -> bool {
    rules(route)
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .any(|path| backend_service_name(path) == Some(service_name))
}

/// Backend of the single managed path.
pub fn route_backend(route: &Ingress) -> Option<Backend> {
    let path = first_path(rules(route))?;
    let service = path.backend.service.as_ref()?;
    Some(Backend {
        service_name: service.name.clone(),
        port: service
            .port
            .as_ref()
            .and_then(|p| p.number)
            .unwrap_or(0),
    })
}

/// Rules of `route` with `patch` applied to the backend of the single path.
/// Host, rule count and path count are carried over unchanged.
pub fn patched_rules(route: &Ingress, patch: &BackendPatch) -> Result<Vec<IngressRule>> {
    let mut rules = rules(route).to_vec();
    let path = rules
        .first_mut()
        .and_then(|rule| rule.http.as_mut())
        .and_then(|http| http.paths.first_mut())
        .ok_or_else(|| {
            Error::InvalidResource(format!(
                "Ingress {}/{} has no path to patch",
                route.namespace().unwrap_or_default(),
                route.name_any()
            ))
        })?;

    let service = path
        .backend
        .service
        .get_or_insert_with(IngressServiceBackend::default);
    if let Some(name) = &patch.service_name {
        service.name = name.clone();
    }
    if let Some(port) = patch.port {
        service.port = Some(ServiceBackendPort {
            number: Some(port),
            name: None,
        });
    }
    Ok(rules)
}

/// Random host under `domain`, for example `3f9a0c...e1.apps.example.com`.
pub fn generate_host(domain: &str) -> String {
    let bytes: [u8; HOST_RANDOM_BYTES] = rand::rng().random();
    let label = hex::encode(bytes);
    let domain = domain.trim_start_matches('.');
    format!("{label}.{domain}")
}

fn service_backend(backend: &Backend) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: backend.service_name.clone(),
            port: Some(ServiceBackendPort {
                number: Some(backend.port),
                name: None,
            }),
        }),
        ..Default::default()
    }
}

fn rules(route: &Ingress) -> &[IngressRule] {
    route
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_deref())
        .unwrap_or_default()
}

fn first_path(rules: &[IngressRule]) -> Option<&HTTPIngressPath> {
    rules.first()?.http.as_ref()?.paths.first()
}

fn backend_service_name(path: &HTTPIngressPath) -> Option<&str> {
    path.backend.service.as_ref().map(|s| s.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, port: i32) -> Backend {
        Backend {
            service_name: name.into(),
            port,
        }
    }

    fn route() -> Ingress {
        desired_route(
            "ing-web".into(),
            "ns1".into(),
            "abc.apps.example.com".into(),
            &backend("svc-web", 8080),
        )
    }

    #[test]
    fn test_desired_route() {
        let ing = route();
        assert_eq!(ing.metadata.name.as_deref(), Some("ing-web"));
        assert_eq!(ing.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(
            ing.annotations().get(REWRITE_TARGET_ANNOTATION).map(String::as_str),
            Some("/")
        );

        let rules = rules(&ing);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host.as_deref(), Some("abc.apps.example.com"));
        let paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path.as_deref(), Some("/"));
        assert_eq!(paths[0].path_type, "Prefix");
        assert_eq!(route_backend(&ing), Some(backend("svc-web", 8080)));
    }

    #[test]
    fn test_targets_service() {
        let ing = route();
        assert!(targets_service(&ing, "svc-web"));
        assert!(!targets_service(&ing, "svc-web2"));
        assert!(!targets_service(&Ingress::default(), "svc-web"));
    }

    #[test]
    fn test_backend_patch_between() {
        let old = backend("svc-web", 8080);

        assert!(BackendPatch::between(&old, &old).is_empty());
        assert_eq!(
            BackendPatch::between(&old, &backend("svc-web2", 8080)),
            BackendPatch {
                service_name: Some("svc-web2".into()),
                port: None,
            }
        );
        assert_eq!(
            BackendPatch::between(&old, &backend("svc-web", 9090)),
            BackendPatch {
                service_name: None,
                port: Some(9090),
            }
        );
        // an unresolved port never replaces a known one
        assert!(BackendPatch::between(&old, &backend("svc-web", 0)).is_empty());
        assert_eq!(
            BackendPatch::between(&backend("svc-web", 0), &backend("svc-web", 80)).port,
            Some(80)
        );
    }

    #[test]
    fn test_patched_rules_only_touch_backend() {
        let ing = route();
        let patch = BackendPatch {
            service_name: Some("svc-web2".into()),
            port: None,
        };
        let rules = patched_rules(&ing, &patch).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host.as_deref(), Some("abc.apps.example.com"));
        let mut patched = ing.clone();
        patched.spec.as_mut().unwrap().rules = Some(rules);
        assert_eq!(route_backend(&patched), Some(backend("svc-web2", 8080)));

        let rules = patched_rules(
            &patched,
            &BackendPatch {
                service_name: None,
                port: Some(9090),
            },
        )
        .unwrap();
        patched.spec.as_mut().unwrap().rules = Some(rules);
        assert_eq!(route_backend(&patched), Some(backend("svc-web2", 9090)));
    }

    #[test]
    fn test_patched_rules_without_path() {
        let err = patched_rules(&Ingress::default(), &BackendPatch::default());
        assert!(matches!(err, Err(Error::InvalidResource(_))));
    }

    #[test]
    fn test_generate_host() {
        let a = generate_host("apps.example.com");
        let b = generate_host(".apps.example.com");
        assert!(a.ends_with(".apps.example.com"));
        assert!(b.ends_with(".apps.example.com"));
        assert!(!b.contains(".."));
        assert_ne!(a, b);

        let label = a.split('.').next().unwrap();
        assert_eq!(label.len(), HOST_RANDOM_BYTES * 2);
        assert!(label.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
