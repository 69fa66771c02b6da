use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;

use crate::config::Config;

const EXTERNAL_ACCESS_ENABLED: &str = "true";

/// Decides from annotations and namespace whether a resource takes part in
/// automation.
#[derive(Clone, Debug)]
pub struct EligibilityPolicy {
    managed_by_annotation: String,
    managed_by_marker: String,
    external_access_annotation: String,
    excluded_namespaces: BTreeSet<String>,
}

impl EligibilityPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            managed_by_annotation: config.managed_by_annotation.clone(),
            managed_by_marker: config.managed_by_marker.clone(),
            external_access_annotation: config.external_access_annotation.clone(),
            excluded_namespaces: config.excluded_namespaces.clone(),
        }
    }

    pub fn is_managed(&self, annotations: &BTreeMap<String, String>) -> bool {
        annotations.get(&self.managed_by_annotation) == Some(&self.managed_by_marker)
    }

    pub fn allows_external_access(&self, annotations: &BTreeMap<String, String>) -> bool {
        annotations
            .get(&self.external_access_annotation)
            .is_some_and(|v| v == EXTERNAL_ACCESS_ENABLED)
    }

    pub fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded_namespaces.contains(namespace)
    }

    /// Managed and outside the excluded namespaces.
    pub fn is_eligible<K: ResourceExt>(&self, resource: &K) -> bool {
        let namespace = resource.namespace().unwrap_or_default();
        !self.is_excluded(&namespace) && self.is_managed(resource.annotations())
    }

    pub fn managed_by_annotation(&self) -> &str {
        &self.managed_by_annotation
    }

    pub fn managed_by_marker(&self) -> &str {
        &self.managed_by_marker
    }

    pub fn external_access_annotation(&self) -> &str {
        &self.external_access_annotation
    }
}
