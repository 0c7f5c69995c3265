//! Broker process entry point. Loads configuration, initializes logging,
//! accepts connections, and drains them on Ctrl-C, SIGTERM, or the
//! cellaserv `shutdown` method.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use broker_core::{Config, PublishLog, Registries, Router};
use broker_transport_tcp::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    tracing::info!(
        listen_address = %config.listen_address,
        request_timeout_secs = config.request_timeout.as_secs(),
        publish_logging_enabled = config.publish_logging_enabled,
        "configuration loaded"
    );

    let publish_log = if config.publish_logging_enabled {
        Some(PublishLog::init(&config.logs_dir).context("failed to initialize publish logging")?)
    } else {
        None
    };

    let registries = Registries::new();
    let shutdown = Arc::new(Notify::new());
    let router = Arc::new(Router::new(
        registries,
        publish_log,
        config.request_timeout,
        shutdown.clone(),
    ));

    let listener = TcpListener::bind(config.listen_address)
        .await
        .context("failed to bind listener")?;
    tracing::info!(addr = %listener.local_addr(), "listening");

    run_accept_loop(listener, router, shutdown).await;
    tracing::info!("broker shut down");
    Ok(())
}

async fn run_accept_loop(listener: TcpListener, router: Arc<Router>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                tracing::info!("shutdown signal received; closing listener");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received; closing listener");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let router = router.clone();
                        tokio::spawn(async move {
                            broker_core::serve_connection(stream, peer, router).await;
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept connection");
                    }
                }
            }
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
