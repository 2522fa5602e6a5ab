use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracker_backend::fleet::FleetTable;
use tracker_backend::ingest::{Pipeline, memory_queue};
use tracker_backend::locator::Locator;
use tracker_backend::{RateLimitConfig, create_app};
use tracker_db::Database;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting player tracker...");
    // Load configuration from environment variables or use defaults
    let config = tracker_backend::config::Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, store_timeout={}ms",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.store_timeout.as_millis()
    );
    tracing::info!(
        "Rate limits: query={}/sec (burst {}), ingest={}/sec (burst {})",
        config.rate_limit_query_per_sec,
        config.rate_limit_query_burst,
        config.rate_limit_ingest_per_sec,
        config.rate_limit_ingest_burst
    );

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db.with_operation_timeout(config.store_timeout),
        Err(e) => {
            tracing::error!("Failed to open database {}: {}", config.database_path, e);
            return ExitCode::FAILURE;
        }
    };
    let fleets = Arc::new(FleetTable::standard());
    let locator = Locator::new(db.clone(), fleets);

    let (publisher, consumer) = memory_queue(&config.queue_name, config.queue_capacity);
    tracing::info!(
        "Consuming queue {} (capacity {})",
        consumer.queue_name(),
        config.queue_capacity
    );
    let pipeline = Pipeline::new(consumer, db).with_retry_delay(config.ingest_retry_delay);
    let worker = tokio::spawn(pipeline.run());

    let rate_limit = RateLimitConfig {
        query_per_sec: config.rate_limit_query_per_sec,
        query_burst: config.rate_limit_query_burst,
        ingest_per_sec: config.rate_limit_ingest_per_sec,
        ingest_burst: config.rate_limit_ingest_burst,
    };
    let app = create_app(
        locator,
        publisher,
        config.request_body_limit,
        config.request_timeout,
        Some(rate_limit),
    );
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Server listening on {}", addr);

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        result = worker => {
            if let Err(e) = result {
                tracing::error!("Ingestion worker failed: {}", e);
                return ExitCode::FAILURE;
            }
            tracing::warn!("Ingestion worker stopped");
        }
    }
    ExitCode::SUCCESS
}
