use autoexpose::config::{Cli, Commands};
use autoexpose::{Result, controller, http};
use clap::Parser;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_subscriber();
    let cancel = tokio_util::sync::CancellationToken::new();
    // cancelled by the engine once every cache has synced
    let ready = tokio_util::sync::CancellationToken::new();
    match cli.command {
        Commands::Controller(controller_args) => {
            let mut metrics_handle = tokio::spawn(http::serve_metrics(
                controller_args.metrics_address,
                ready.child_token(),
                cancel.child_token(),
            ));
            let mut controller_handle = tokio::spawn(controller::start(
                controller_args,
                ready,
                cancel.child_token(),
            ));
            let mut shutdown_handle = tokio::spawn(async move { shutdown_signal().await });
            // watch for shutdown and errors
            let mut ok = true;
            let (metrics_done, controller_done) = tokio::select! {
                h = &mut metrics_handle => {
                    ok &= exit("metrics", h);
                    (true, false)
                },
                h = &mut controller_handle => {
                    ok &= exit("controller", h);
                    (false, true)
                },
                _ = &mut shutdown_handle => (false, false),
            };
            // a single failed task takes the other one down with it
            cancel.cancel();
            if !metrics_done {
                ok &= exit("metrics", metrics_handle.await);
            }
            if !controller_done {
                ok &= exit("controller", controller_handle.await);
            }
            info!("Exiting...");
            if !ok {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn setup_subscriber() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "autoexpose=info,autoexpose_controller=info,autoexpose_k8s_utils=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(%e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(%e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {
          info!("captured ctrl_c signal");
        },
        _ = terminate => {
          info!("captured terminate signal");
        },
    }
}

/// Logs how a task ended, returning false when it failed.
fn exit(task: &str, out: Result<Result<()>, JoinError>) -> bool {
    match out {
        Ok(Ok(_)) => {
            info!("{task} exited");
            true
        }
        Ok(Err(e)) => {
            error!("{task} failed with error: {e}");
            false
        }
        Err(e) => {
            error!("{task} task failed to complete: {e}");
            false
        }
    }
}
