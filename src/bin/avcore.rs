//! AVCore resilience daemon
//!
//! Loads configuration, builds the core, runs the janitor and logs a health
//! summary until shut down.
//!
//! ```text
//! avcore [CONFIG] [--check]
//! ```
//!
//! `--check` prints the effective configuration as JSON and exits.

use anyhow::Context;
use avcore::{Core, CoreConfig, init_tracing, spawn_janitor};
use std::path::PathBuf;
use std::time::Duration;

const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut path: Option<PathBuf> = None;
    let mut check = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--check" => check = true,
            other if other.starts_with('-') => anyhow::bail!("unknown flag `{other}`"),
            other => path = Some(PathBuf::from(other)),
        }
    }

    let config = CoreConfig::load_from(path.as_deref(), None)
        .with_context(|| match &path {
            Some(p) => format!("loading {}", p.display()),
            None => "loading configuration".to_string(),
        })?;

    if check {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config.logging)?;
    let core = Core::from_config(&config)?;

    let janitor = config
        .janitor
        .enabled
        .then(|| spawn_janitor(&core, config.janitor));

    let reporter = {
        let core = core.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = core.health();
                if report.healthy {
                    tracing::info!(summary = %report.summary(), "health");
                } else {
                    tracing::warn!(open = ?report.open_circuits, summary = %report.summary(), "degraded");
                }
            }
        })
    };

    tracing::info!("avcore running");
    shutdown_signal().await;

    reporter.abort();
    if let Some(janitor) = janitor {
        janitor.shutdown().await;
    }
    tracing::info!(summary = %core.health().summary(), "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
