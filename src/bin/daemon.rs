//! Budgetpal daemon entry point.
//!
//! Wires the Plaid and Twilio clients into the scheduler, starts the
//! control surface, and shuts down cleanly on SIGINT/SIGTERM. Job-level
//! errors are handled inside the scheduler and never exit the process;
//! only startup failures do.

use budgetpal::config::DaemonConfig;
use budgetpal::notifier::Notifier;
use budgetpal::plaid::PlaidClient;
use budgetpal::scheduler::Scheduler;
use budgetpal::server::run_server;
use budgetpal::twilio::TwilioClient;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = DaemonConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        anyhow::anyhow!("invalid configuration: {e}")
    })?;

    tracing::info!("budgetpal daemon starting");
    let started = Instant::now();

    let source = Arc::new(PlaidClient::new(&config.plaid));
    let client = Arc::new(TwilioClient::new(&config.twilio));
    let notifier = Arc::new(Notifier::new(client, &config.twilio));
    let scheduler = Arc::new(Scheduler::new(&config, source, notifier.clone()));

    scheduler.start();

    // Periodic process-health log line for external supervisors.
    let health_scheduler = Arc::clone(&scheduler);
    let health_interval = Duration::from_secs(config.schedule.health_log_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(health_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            tracing::info!(
                uptime_secs = started.elapsed().as_secs(),
                last_run_at = ?health_scheduler.last_run_at().map(|t| t.to_rfc3339()),
                "process healthy"
            );
        }
    });

    run_server(
        &config.server,
        Arc::clone(&scheduler),
        notifier,
        shutdown_signal(),
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "control surface failed");
        e
    })?;

    scheduler.stop();
    tracing::info!("budgetpal daemon shut down cleanly");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down gracefully"),
        () = terminate => tracing::info!("received SIGTERM, shutting down gracefully"),
    }
}
