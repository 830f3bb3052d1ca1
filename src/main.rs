//! async-tasks service binary.

use anyhow::{Context, Result};
use async_tasks::{
    api,
    behaviors::{StatusChangeTimeout, status_change_timeout::BEHAVIOR_TYPE},
    config::{DEFAULT_CONFIG_PATH, ServiceConfig},
    processing::{BehaviorScheduler, ProcessorRegistry},
    task::{
        adapters::postgres::{PostgresTaskStore, TaskPgPool},
        services::TaskService,
    },
    telemetry,
};
use clap::Parser;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "async-tasks",
    version,
    about = "Asynchronous task tracking service"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listening port; overrides `http.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    telemetry::init(config.log.format).map_err(|err| anyhow::anyhow!(err))?;

    let pool: TaskPgPool = Pool::builder()
        .max_size(config.db.pool_size)
        .build(ConnectionManager::<PgConnection>::new(&config.db.uri))
        .context("connecting to the database")?;
    let store = Arc::new(PostgresTaskStore::new(pool));
    let service = TaskService::new(Arc::clone(&store));

    let count = service.count_tasks().await.context("counting tasks")?;
    tracing::info!(count, "connected to the task store");

    let registry: ProcessorRegistry<PostgresTaskStore> = ProcessorRegistry::new()
        .with_processor(BEHAVIOR_TYPE, Arc::new(StatusChangeTimeout));
    let scheduler = BehaviorScheduler::new(
        store,
        Arc::new(DefaultClock),
        registry,
        config.scheduler.settings(),
    );
    let shutdown = CancellationToken::new();
    let scheduler_shutdown = shutdown.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let port = cli.port.unwrap_or(config.http.port);
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(%address, "listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            server_shutdown.cancel();
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    scheduler_task.await.context("joining the scheduler")?;
    tracing::info!("shut down");
    Ok(())
}
