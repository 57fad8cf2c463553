use std::sync::Arc;

use anyhow::Context;
use steved::api::job_routes;
use steved::config::ServerConfig;
use steved::jobs::{JobOrchestrator, LifecycleController};
use steved::notify::{NotificationDispatcher, SlackWebhook};
use steved::runtime::DockerRuntime;
use steved::tasks::TaskSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    // ── Container runtime ───────────────────────────────────────────────
    let runtime = Arc::new(DockerRuntime::connect()?);
    let mut controller = LifecycleController::new(runtime);
    if let Some(credentials) = config.registry_auth.clone() {
        controller = controller.with_credentials(credentials);
        tracing::info!("Registry authentication enabled");
    }
    if let Some(timeout) = config.job_timeout {
        controller = controller.with_timeout(timeout);
        tracing::info!(timeout = ?timeout, "Job timeout enabled");
    }

    // ── Notifications ───────────────────────────────────────────────────
    let notifier = NotificationDispatcher::spawn(Arc::new(SlackWebhook::new(config.notify_timeout)));

    // ── HTTP ────────────────────────────────────────────────────────────
    let orchestrator = Arc::new(JobOrchestrator::new(
        TaskSource::new(&config.tasks_path),
        controller,
        notifier,
    ));
    let app = job_routes(orchestrator);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        tasks = %config.tasks_path.display(),
        "steved listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
