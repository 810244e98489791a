use std::sync::Arc;

use workflow_runner::api::api_routes;
use workflow_runner::config::RunnerConfig;
use workflow_runner::jobs::JobRegistry;
use workflow_runner::store::{Database, LibSqlBackend};
use workflow_runner::worker::{TaskRunner, spawn_task_poller};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RunnerConfig::from_env()?;
    let definition = Arc::new(config.workflow_definition()?);

    eprintln!("Workflow runner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Workflow: {} ({} steps)",
        definition.name,
        definition.steps.len()
    );
    eprintln!("   API: http://0.0.0.0:{}", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── Jobs + runner ────────────────────────────────────────────────────
    let registry = Arc::new(JobRegistry::with_builtin_jobs(Arc::clone(&store)));
    registry.check_definition(&definition)?;
    tracing::info!(jobs = ?registry.list(), "Job registry ready");
    let runner = Arc::new(TaskRunner::new(Arc::clone(&store), registry));

    let poller = spawn_task_poller(Arc::clone(&store), runner, &config);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = api_routes(Arc::clone(&store), definition);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "HTTP server started");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    poller.abort();
    Ok(())
}
