use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use afriflow::services::{OrchestrationService, Reconciler};
use afriflow::store::{PostgresTransactionStore, TransactionStore};
use afriflow::{build_registry, config, create_app, startup, AppState};

#[derive(Parser)]
#[command(name = "afriflow", about = "Payment gateway orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and reconciliation loop (default).
    Serve,
    /// Run the startup validation report and exit.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let registry = Arc::new(build_registry(&config)?);
    tracing::info!(
        providers = ?registry.all().iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
        "provider registry built"
    );

    if let Some(Command::Validate) = cli.command {
        let report = startup::validate_environment(&config, &pool, &registry).await?;
        report.print();
        if !report.is_valid() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let store: Arc<dyn TransactionStore> = Arc::new(PostgresTransactionStore::new(pool));
    let orchestrator = Arc::new(OrchestrationService::new(registry, Arc::clone(&store)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(Arc::clone(&orchestrator), store, &config);
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown_rx));

    let app = create_app(AppState { orchestrator });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the reconciler finish any in-flight verifications before exit.
    let _ = shutdown_tx.send(true);
    let _ = reconciler_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
