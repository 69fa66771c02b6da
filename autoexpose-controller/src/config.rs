use std::collections::BTreeSet;
use std::time::Duration;

pub const DEFAULT_MANAGED_BY_ANNOTATION: &str = "autoexpose.dev/managed-by";
pub const DEFAULT_EXTERNAL_ACCESS_ANNOTATION: &str = "autoexpose.dev/allow-internet-access";
pub const DEFAULT_SERVICE_PREFIX: &str = "svc-";
pub const DEFAULT_ROUTE_PREFIX: &str = "ing-";
pub const DEFAULT_EXCLUDED_NAMESPACES: [&str; 4] =
    ["kube-system", "kube-public", "ingress-nginx", "monitor"];
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine settings, resolved once at start-up.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Annotation whose value must equal `managed_by_marker` for a resource
    /// to take part in automation.
    pub managed_by_annotation: String,
    pub managed_by_marker: String,
    /// Annotation opting a Service into an Ingress when set to `"true"`.
    pub external_access_annotation: String,
    pub service_prefix: String,
    pub route_prefix: String,
    /// Domain generated Ingress hosts are placed under.
    pub public_dns_domain: String,
    pub excluded_namespaces: BTreeSet<String>,
    pub resync: Option<Duration>,
    pub sync_timeout: Duration,
}

impl Config {
    pub fn new(managed_by_marker: impl Into<String>, public_dns_domain: impl Into<String>) -> Self {
        Self {
            managed_by_annotation: DEFAULT_MANAGED_BY_ANNOTATION.into(),
            managed_by_marker: managed_by_marker.into(),
            external_access_annotation: DEFAULT_EXTERNAL_ACCESS_ANNOTATION.into(),
            service_prefix: DEFAULT_SERVICE_PREFIX.into(),
            route_prefix: DEFAULT_ROUTE_PREFIX.into(),
            public_dns_domain: public_dns_domain.into(),
            excluded_namespaces: DEFAULT_EXCLUDED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
            resync: None,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}
