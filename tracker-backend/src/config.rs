use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 1048576 = 1MB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "player-tracker.db")
    pub database_path: String,

    /// Deadline for each store operation, in milliseconds
    /// Env: STORE_TIMEOUT_MS (default: 5000)
    pub store_timeout: Duration,

    /// Name of the queue lifecycle events are consumed from
    /// Env: QUEUE_NAME (default: "player-tracker:all")
    pub queue_name: String,

    /// How many published events may wait for the worker
    /// Env: QUEUE_CAPACITY (default: 1024)
    pub queue_capacity: usize,

    /// Pause after a store failure before the worker takes the next event, in milliseconds
    /// Env: INGEST_RETRY_DELAY_MS (default: 500)
    pub ingest_retry_delay: Duration,

    /// Rate limit for query endpoints (requests per second)
    /// Env: RATE_LIMIT_QUERY_PER_SEC (default: 100)
    pub rate_limit_query_per_sec: u64,

    /// Burst size for query endpoints
    /// Env: RATE_LIMIT_QUERY_BURST (default: 200)
    pub rate_limit_query_burst: u32,

    /// Rate limit for the event publish endpoint (requests per second)
    /// Env: RATE_LIMIT_INGEST_PER_SEC (default: 500)
    /// Proxies publish a message for every join, leave and server switch
    pub rate_limit_ingest_per_sec: u64,

    /// Burst size for the event publish endpoint
    /// Env: RATE_LIMIT_INGEST_BURST (default: 1000)
    pub rate_limit_ingest_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv();
        let defaults = Self::default();
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", defaults.port),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            store_timeout: Duration::from_millis(env_or_default("STORE_TIMEOUT_MS", 5000)),
            queue_name: env_or_default_string("QUEUE_NAME", &defaults.queue_name),
            queue_capacity: env_or_default("QUEUE_CAPACITY", defaults.queue_capacity),
            ingest_retry_delay: Duration::from_millis(env_or_default("INGEST_RETRY_DELAY_MS", 500)),
            rate_limit_query_per_sec: env_or_default(
                "RATE_LIMIT_QUERY_PER_SEC",
                defaults.rate_limit_query_per_sec,
            ),
            rate_limit_query_burst: env_or_default(
                "RATE_LIMIT_QUERY_BURST",
                defaults.rate_limit_query_burst,
            ),
            rate_limit_ingest_per_sec: env_or_default(
                "RATE_LIMIT_INGEST_PER_SEC",
                defaults.rate_limit_ingest_per_sec,
            ),
            rate_limit_ingest_burst: env_or_default(
                "RATE_LIMIT_INGEST_BURST",
                defaults.rate_limit_ingest_burst,
            ),
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            request_body_limit: 1024 * 1024, // 1 MB
            request_timeout: Duration::from_secs(30),
            port: 3000,
            database_path: "player-tracker.db".to_string(),
            store_timeout: Duration::from_secs(5),
            queue_name: "player-tracker:all".to_string(),
            queue_capacity: 1024,
            ingest_retry_delay: Duration::from_millis(500),
            rate_limit_query_per_sec: 100,
            rate_limit_query_burst: 200,
            rate_limit_ingest_per_sec: 500,
            rate_limit_ingest_burst: 1000,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
