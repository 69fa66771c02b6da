use std::net::SocketAddr;
use std::time::Duration;

use autoexpose_controller::{
    Config, DEFAULT_EXCLUDED_NAMESPACES, DEFAULT_EXTERNAL_ACCESS_ANNOTATION,
    DEFAULT_MANAGED_BY_ANNOTATION, DEFAULT_ROUTE_PREFIX, DEFAULT_SERVICE_PREFIX,
    DEFAULT_SYNC_TIMEOUT,
};
use clap::{Parser, Subcommand};

use crate::Error;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    Controller(ControllerArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    /// Annotation marking resources as managed
    #[arg(long, env = "MANAGED_BY_ANNOTATION", default_value = DEFAULT_MANAGED_BY_ANNOTATION)]
    pub managed_by_annotation: String,

    /// Value the managed-by annotation must carry
    #[arg(long, env = "MANAGED_BY_MARKER")]
    pub managed_by_marker: String,

    /// Annotation opting a workload into an Ingress
    #[arg(
        long,
        env = "EXTERNAL_ACCESS_ANNOTATION",
        default_value = DEFAULT_EXTERNAL_ACCESS_ANNOTATION
    )]
    pub external_access_annotation: String,

    #[arg(long, env = "SERVICE_PREFIX", default_value = DEFAULT_SERVICE_PREFIX)]
    pub service_prefix: String,

    #[arg(long, env = "ROUTE_PREFIX", default_value = DEFAULT_ROUTE_PREFIX)]
    pub route_prefix: String,

    /// Domain generated Ingress hosts are placed under
    #[arg(long, env = "PUBLIC_DNS_DOMAIN")]
    pub public_dns_domain: String,

    /// Namespaces that are never touched
    #[arg(
        long,
        env = "EXCLUDED_NAMESPACES",
        value_delimiter = ',',
        default_values = DEFAULT_EXCLUDED_NAMESPACES
    )]
    pub excluded_namespaces: Vec<String>,

    /// Interval at which every cached object is handled again, 0 disables it
    #[arg(long, env = "RESYNC_DURATION_IN_SECONDS", default_value_t = 0)]
    pub resync_seconds: u64,

    /// How long to wait for the initial listing of every watched kind
    #[arg(
        long,
        env = "SYNC_TIMEOUT_SECONDS",
        default_value_t = DEFAULT_SYNC_TIMEOUT.as_secs()
    )]
    pub sync_timeout_seconds: u64,

    /// Metrics listener for the controller
    #[arg(long, env = "METRICS_ADDRESS", default_value = "0.0.0.0:9090")]
    pub metrics_address: SocketAddr,
}

impl TryFrom<&ControllerArgs> for Config {
    type Error = Error;

    fn try_from(args: &ControllerArgs) -> Result<Self, Self::Error> {
        if args.managed_by_marker.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "managed-by marker must not be empty".into(),
            ));
        }
        if args.public_dns_domain.trim_matches('.').is_empty() {
            return Err(Error::InvalidConfig(
                "public dns domain must not be empty".into(),
            ));
        }

        let mut config = Config::new(&args.managed_by_marker, &args.public_dns_domain);
        config.managed_by_annotation = args.managed_by_annotation.clone();
        config.external_access_annotation = args.external_access_annotation.clone();
        config.service_prefix = args.service_prefix.clone();
        config.route_prefix = args.route_prefix.clone();
        config.excluded_namespaces = args
            .excluded_namespaces
            .iter()
            .map(|ns| ns.trim())
            .filter(|ns| !ns.is_empty())
            .map(String::from)
            .collect();
        config.resync = (args.resync_seconds > 0).then(|| Duration::from_secs(args.resync_seconds));
        config.sync_timeout = Duration::from_secs(args.sync_timeout_seconds);
        Ok(config)
    }
}
