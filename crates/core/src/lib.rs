pub mod config;
pub mod database;
pub mod error;
pub mod metrics;

pub use config::{ApiConfig, CacheConfig, Config, CorsConfig, FlushConfig, PgConfig, ServerConfig};
pub use database::PoolRegistry;
pub use error::{Error, ErrorCode, ErrorContext, ErrorMetrics, Result};
pub use metrics::{MetricsRegistry, MetricsService};

// Re-export commonly used types from dependencies
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};