//! Error types for scheduled requests.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error type accepted from request actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reason used when a request is cancelled without an explicit reason.
pub const DEFAULT_CANCEL_REASON: &str = "request cancelled";

/// Reason used when a handle's settle channel is dropped without a result.
pub(crate) const DROPPED_REASON: &str = "request dropped by scheduler";

/// Outcome of a request that did not produce a value.
///
/// Cancellation and action failure share one type so that every waiter
/// handles them through the same `Err` path; the variant tells them apart.
/// The error is cheap to clone because every waiter of a deduplicated request
/// receives its own copy.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The request was cancelled by a caller.
    #[error("{reason}")]
    Cancelled {
        /// Reason supplied to `cancel_request` / `cancel_all_requests`.
        reason: Arc<str>,
    },

    /// The request's action returned an error (or panicked).
    #[error("request failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl RequestError {
    /// Creates a cancellation error with the given reason.
    pub fn cancelled(reason: impl Into<Arc<str>>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Wraps an action failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(error.into()))
    }

    /// Returns true if the request was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the cancellation reason, if this is a cancellation.
    pub fn cancel_reason(&self) -> Option<&str> {
        match self {
            Self::Cancelled { reason } => Some(reason),
            Self::Failed(_) => None,
        }
    }
}
