use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_server::{build_state, logging, router, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(LoadOptions::default()).context("loading configuration")?;
    logging::init(&config.logging)?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let scheduler_enabled = config.scheduler.enabled;
    let state = build_state(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = scheduler_enabled.then(|| {
        tokio::spawn(scheduler::run(Arc::clone(&state), shutdown_rx))
    });
    if !scheduler_enabled {
        info!(event_name = "scheduler_disabled", "running webhook-only");
    }

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(event_name = "server_listening", %address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    // Stop the sweep loops and wait for an in-flight pass to finish.
    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    info!(event_name = "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(event_name = "signal_listen_failed", %error);
    }
}
