//! Error taxonomy for the completion engine.
//!
//! Business-rule rejections carry a machine-readable kind and are always
//! surfaced to the caller; storage failures during the atomic persist step are
//! kept distinct so clients can tell "you broke a rule" from "try again".

use thiserror::Error;

/// A synchronous business-rule rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Missing or malformed identifiers or required fields. Client-caused;
    /// not retryable without correction.
    #[error("{0}")]
    InvalidInput(String),

    /// Referenced quest/routine doesn't exist or isn't owned by the caller.
    #[error("{0}")]
    NotFound(String),

    /// Cooldown still active; retryable after the indicated wait.
    #[error("cooldown active, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: i64 },

    /// Daily target already met; retryable tomorrow, not by waiting.
    #[error("{0}")]
    LimitReached(String),

    /// Duplicate unique value (e.g. an active routine with the same title).
    #[error("{0}")]
    Conflict(String),
}

impl Rejection {
    /// Stable machine-readable kind string for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InvalidInput(_) => "INVALID_INPUT",
            Rejection::NotFound(_) => "NOT_FOUND",
            Rejection::RateLimited { .. } => "RATE_LIMITED",
            Rejection::LimitReached(_) => "LIMIT_REACHED",
            Rejection::Conflict(_) => "CONFLICT",
        }
    }
}

/// Engine-level failure: either a rejection or a transient storage error.
///
/// A storage failure during PERSISTED aborts the whole completion; the
/// transaction in the store guarantees no partial user-state write is visible.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Rejection::InvalidInput("x".into()).kind(), "INVALID_INPUT");
        assert_eq!(Rejection::NotFound("x".into()).kind(), "NOT_FOUND");
        assert_eq!(
            Rejection::RateLimited { retry_after_seconds: 5 }.kind(),
            "RATE_LIMITED"
        );
        assert_eq!(Rejection::LimitReached("x".into()).kind(), "LIMIT_REACHED");
        assert_eq!(Rejection::Conflict("x".into()).kind(), "CONFLICT");
    }

    #[test]
    fn rate_limited_message_names_the_wait() {
        let r = Rejection::RateLimited { retry_after_seconds: 1800 };
        assert!(r.to_string().contains("1800"));
    }
}
