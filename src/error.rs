//! Error types shared by every effector and decorator

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for effector calls
pub type Result<T> = std::result::Result<T, EffectorError>;

/// Why a [`Context`](crate::context::Context) fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was cancelled explicitly
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error vocabulary of the effector contract.
///
/// Decorators only produce their own variants when they refuse to invoke the
/// inner operation (breaker open, bucket empty) or when the caller's context
/// preempts a wait. Everything the inner operation returns comes back as-is.
#[derive(Debug, Clone, Error)]
pub enum EffectorError {
    /// Circuit breaker gated the call without attempting it
    #[error("service unreachable")]
    ServiceUnreachable,

    /// Token bucket exhausted
    #[error("too many calls")]
    Throttled,

    /// The caller's context fired first
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The wrapped operation's own error
    #[error("{0}")]
    Inner(Arc<dyn StdError + Send + Sync>),
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl EffectorError {
    /// Wrap an arbitrary error coming from the inner operation.
    pub fn inner<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Inner(Arc::new(err))
    }

    /// Inner failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Inner(Arc::new(Message(message.into())))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Context errors are final: once the caller's context fired every
    /// further attempt would fail the same way.
    pub fn is_retryable(&self) -> bool {
        !self.is_cancellation()
    }
}
