pub mod config;
mod error;
pub mod fleet;
pub mod ingest;
pub mod locator;
mod routes;
pub mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use ingest::MemoryPublisher;
use locator::Locator;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub struct AppState {
    pub locator: Locator,
    pub publisher: MemoryPublisher,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for the query endpoints
    pub query_per_sec: u64,
    /// Burst size for the query endpoints
    pub query_burst: u32,
    /// Requests per second for the event publish endpoint
    pub ingest_per_sec: u64,
    /// Burst size for the event publish endpoint
    pub ingest_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            query_per_sec: 100,
            query_burst: 200,
            ingest_per_sec: 500,
            ingest_burst: 1000,
        }
    }
}

/// Create the application router.
///
/// Rate limiting keys on the client address, so a limited router must be
/// served with `into_make_service_with_connect_info`. Pass `None` to build it
/// without limits.
pub fn create_app(
    locator: Locator,
    publisher: MemoryPublisher,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: Option<RateLimitConfig>,
) -> Router {
    let state = Arc::new(AppState { locator, publisher });

    let mut query_routes = Router::new()
        .route("/players/{player_id}", get(routes::player_location))
        .route("/players/locations", post(routes::player_locations))
        .route("/servers/{server_id}/players", get(routes::server_players))
        .route(
            "/servers/{server_id}/player-count",
            get(routes::server_player_count),
        )
        .route(
            "/server-types/{server_type}/player-count",
            get(routes::server_type_player_count),
        )
        .route(
            "/server-types/player-count",
            post(routes::server_types_player_count),
        )
        .route("/player-count", get(routes::player_count));

    // Proxies publish on every join, leave and switch
    let mut ingest_routes = Router::new().route("/events", post(routes::publish_event));

    if let Some(limits) = rate_limit {
        query_routes = rate_limited(query_routes, limits.query_per_sec, limits.query_burst);
        ingest_routes = rate_limited(ingest_routes, limits.ingest_per_sec, limits.ingest_burst);
    }

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(query_routes)
        .merge(ingest_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}

fn rate_limited(
    routes: Router<Arc<AppState>>,
    per_second: u64,
    burst_size: u32,
) -> Router<Arc<AppState>> {
    let Some(governor) = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
    else {
        tracing::warn!(per_second, burst_size, "Rate limit must be non-zero, leaving routes unlimited");
        return routes;
    };
    routes.layer(GovernorLayer::new(governor))
}
