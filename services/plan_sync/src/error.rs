//! services/plan_sync/src/error.rs
//!
//! Defines the primary error type for the plan sync service.

use crate::config::ConfigError;
use plan_sync_core::EngineError;

/// The primary error type for the `plan_sync` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error reported by an engine operation.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Represents an error from the underlying database library.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure applying the remote store schema.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., preparing the cache directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
