use crate::config::Config;

const PORT_NAME_TOKEN: &str = "port-";

/// Deterministic names for derived resources.
#[derive(Clone, Debug)]
pub struct NameScheme {
    service_prefix: String,
    route_prefix: String,
}

impl NameScheme {
    pub fn new(config: &Config) -> Self {
        Self {
            service_prefix: config.service_prefix.clone(),
            route_prefix: config.route_prefix.clone(),
        }
    }

    pub fn service_name(&self, workload: &str) -> String {
        format!("{}{}", self.service_prefix, workload)
    }

    pub fn route_name(&self, service: &str) -> String {
        format!("{}{}", self.route_prefix, self.service_suffix(service))
    }

    pub fn port_name_for(&self, service: &str) -> String {
        format!("{}{}", PORT_NAME_TOKEN, self.service_suffix(service))
    }

    fn service_suffix<'a>(&self, service: &'a str) -> &'a str {
        service
            .strip_prefix(self.service_prefix.as_str())
            .unwrap_or(service)
    }
}
