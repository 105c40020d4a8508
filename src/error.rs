use thiserror::Error;

use crate::domain::VenueId;

/// Main error type for the swap execution service
#[derive(Error, Debug)]
pub enum SwapError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Submission errors — rejected synchronously, never enter the state machine
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    // Execution errors — caught at the engine boundary and converted into
    // the retry-or-fail decision, never propagated as a crash
    #[error("{venue} unavailable: {reason}")]
    VenueUnavailable { venue: VenueId, reason: String },

    #[error("{venue} settlement failed: {reason}")]
    Settlement { venue: VenueId, reason: String },

    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SwapError {
    /// Whether a failure during an execution attempt should be retried.
    ///
    /// Venue timeouts and settlement declines are transient by contract;
    /// anything unexpected inside an attempt is treated the same way so a
    /// single bad order can never take a worker down.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SwapError::Validation(_)
                | SwapError::NotFound { .. }
                | SwapError::RetriesExhausted { .. }
        )
    }
}

/// Result type alias for SwapError
pub type Result<T> = std::result::Result<T, SwapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let venue = SwapError::VenueUnavailable {
            venue: VenueId::VenueA,
            reason: "timeout".into(),
        };
        assert!(venue.is_retryable());

        let settlement = SwapError::Settlement {
            venue: VenueId::VenueB,
            reason: "declined".into(),
        };
        assert!(settlement.is_retryable());

        // Unexpected internal faults retry rather than crash the worker
        assert!(SwapError::Internal("oops".into()).is_retryable());

        assert!(!SwapError::Validation("bad amount".into()).is_retryable());
        assert!(!SwapError::NotFound {
            order_id: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_display_carries_venue() {
        let err = SwapError::VenueUnavailable {
            venue: VenueId::VenueA,
            reason: "no quote within 5000ms".into(),
        };
        assert_eq!(
            err.to_string(),
            "Venue A unavailable: no quote within 5000ms"
        );
    }
}
