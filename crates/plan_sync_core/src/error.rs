//! crates/plan_sync_core/src/error.rs
//!
//! The error taxonomy every engine operation reports to its callers.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The plan, share record or index entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is not the owner of the plan for an owner-only operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The remote store could not be reached or no identity is signed in.
    #[error("Remote store unavailable: {0}")]
    StoreUnavailable(String),

    /// The share targeted by share/accept/reject is missing or no longer pending.
    #[error("Share not found or already processed")]
    ConflictAlreadyProcessed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => EngineError::NotFound(what),
            PortError::Unavailable(why) => EngineError::StoreUnavailable(why),
            PortError::Unauthorized => {
                EngineError::StoreUnavailable("remote store rejected credentials".to_string())
            }
            PortError::Unexpected(why) => EngineError::Store(why),
        }
    }
}

/// A convenience type alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
