use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swapr::api::{create_router, AppState};
use swapr::broadcast::StatusBroadcaster;
use swapr::cli::{Cli, Commands};
use swapr::config::{AppConfig, LoggingConfig};
use swapr::domain::VenueId;
use swapr::engine::scheduler::Scheduler;
use swapr::engine::ExecutionEngine;
use swapr::error::{Result, SwapError};
use swapr::services::Metrics;
use swapr::store::{MemoryStore, OrderStore, PostgresStore};
use swapr::venues::VenueAdapter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        return Err(SwapError::Internal(format!(
            "invalid configuration ({} errors)",
            errors.len()
        )));
    }

    match cli.command {
        Some(Commands::Migrate) => {
            init_logging(&config.logging);
            let database = config.database.as_ref().ok_or_else(|| {
                SwapError::Internal("migrate requires a [database] configuration".to_string())
            })?;
            let store = PostgresStore::new(&database.url, database.max_connections).await?;
            store.migrate().await?;
        }
        Some(Commands::CheckConfig) => {
            println!("configuration in {} is valid", cli.config);
        }
        Some(Commands::Serve { port, memory }) => {
            init_logging(&config.logging);
            serve(config, port, memory).await?;
        }
        None => {
            init_logging(&config.logging);
            serve(config, None, false).await?;
        }
    }

    Ok(())
}

async fn serve(mut config: AppConfig, port_override: Option<u16>, force_memory: bool) -> Result<()> {
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let store = build_store(&config, force_memory).await?;
    let metrics = Arc::new(Metrics::new());
    let broadcaster = Arc::new(StatusBroadcaster::new());

    let venue_a = VenueAdapter::mock(VenueId::VenueA, &config.venue_a, &config.settlement);
    let venue_b = VenueAdapter::mock(VenueId::VenueB, &config.venue_b, &config.settlement);
    let engine = Arc::new(ExecutionEngine::new(
        store.clone(),
        broadcaster.clone(),
        venue_a,
        venue_b,
        config.engine.clone(),
    ));
    let scheduler = Arc::new(Scheduler::start(
        engine,
        metrics.clone(),
        config.scheduler.clone(),
    ));

    requeue_unfinished(&store, &scheduler, &metrics).await?;

    let state = AppState::new(store, scheduler, broadcaster, metrics);
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "swapr listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn build_store(config: &AppConfig, force_memory: bool) -> Result<Arc<dyn OrderStore>> {
    match (&config.database, force_memory) {
        (Some(database), false) => {
            let store = PostgresStore::new(&database.url, database.max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        (database, _) => {
            if database.is_some() {
                warn!("database configured but --memory set, using in-memory store");
            } else {
                warn!("no database configured, orders will not survive restart");
            }
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Re-queue orders that were in flight when the previous process stopped.
async fn requeue_unfinished(
    store: &Arc<dyn OrderStore>,
    scheduler: &Arc<Scheduler>,
    metrics: &Arc<Metrics>,
) -> Result<()> {
    let orders = store.list_orders(1000, 0).await?;
    let mut requeued = 0;
    for order in orders.into_iter().filter(|o| !o.status.is_terminal()) {
        metrics.record_submitted();
        scheduler.enqueue(order.id)?;
        requeued += 1;
    }
    if requeued > 0 {
        info!(requeued, "re-queued unfinished orders from previous run");
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},swapr=debug,sqlx=warn", config.level))
    });

    // File logging is optional (prefer SWAPR_LOG_DIR, fallback to LOG_DIR).
    //
    // Important: `tracing_appender::rolling::daily` panics if it can't create
    // the initial log file, so writability is preflighted first.
    let file_layer = match std::env::var("SWAPR_LOG_DIR").or_else(|_| std::env::var("LOG_DIR")) {
        Ok(log_dir) if std::fs::create_dir_all(&log_dir).is_ok() => {
            let test_path = std::path::Path::new(&log_dir).join(".swapr_write_test");
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&test_path);

                    let file_appender = tracing_appender::rolling::daily(&log_dir, "swapr.log");
                    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                    // Keep the guard alive for the lifetime of the process
                    Box::leak(Box::new(guard));

                    Some(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_target(true),
                    )
                }
                Err(e) => {
                    eprintln!(
                        "Warning: could not write to log directory {log_dir} ({e}), file logging disabled"
                    );
                    None
                }
            }
        }
        Ok(log_dir) => {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            None
        }
        Err(_) => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received");
}
