use autoexpose_controller::{Config, start_engine};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{Result, config::ControllerArgs};

pub async fn start(
    args: ControllerArgs,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let config = Config::try_from(&args)?;
    let client = kube::Client::try_default().await?;

    info!(
        "exposing workloads managed by {}={} under {}",
        config.managed_by_annotation, config.managed_by_marker, config.public_dns_domain
    );
    start_engine(client, config, ready, cancel).await?;
    Ok(())
}
