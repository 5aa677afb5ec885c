//! Deadlines for effectors and for blocking work
//!
//! Two shapes are supported:
//! - [`Timeout`] wraps a blocking [`SlowOperation`]. The operation runs on
//!   the blocking pool and the wrapper returns whichever comes first, its
//!   result or the caller's context firing. The blocking thread is not
//!   interrupted; a late result is dropped.
//! - [`Deadline`] bounds one call of an effector by deriving a child context
//!   with a deadline, handing it to the inner service, and racing the two.

use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

/// A blocking operation taking one argument.
pub trait SlowOperation: Fn(String) -> Result<String> + Send + Sync + 'static {}

impl<F> SlowOperation for F where F: Fn(String) -> Result<String> + Send + Sync + 'static {}

/// Run `slow` on the blocking pool, abandoning it when the context fires.
pub fn timeout<F>(slow: F) -> Timeout<F>
where
    F: Fn(String) -> Result<String> + Send + Sync + 'static,
{
    Timeout::new(slow)
}

/// Service over `(Context, argument)` pairs.
pub struct Timeout<F> {
    slow: Arc<F>,
}

impl<F> Clone for Timeout<F> {
    fn clone(&self) -> Self {
        Self {
            slow: self.slow.clone(),
        }
    }
}

impl<F: SlowOperation> Timeout<F> {
    pub fn new(slow: F) -> Self
    where
        F: Fn(String) -> Result<String>,
    {
        Self {
            slow: Arc::new(slow),
        }
    }
}

impl<F: SlowOperation> Service<(Context, String)> for Timeout<F> {
    type Response = String;
    type Error = EffectorError;
    type Future = EffectorFuture;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (ctx, arg): (Context, String)) -> Self::Future {
        let slow = self.slow.clone();
        Box::pin(async move {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }

            let (tx, rx) = oneshot::channel();
            tokio::task::spawn_blocking(move || {
                // the receiver is gone if the caller already gave up
                let _ = tx.send(slow(arg));
            });

            tokio::select! {
                outcome = rx => match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("slow operation panicked");
                        Err(EffectorError::msg("slow operation panicked"))
                    }
                },
                reason = ctx.done() => {
                    debug!(%reason, "slow operation abandoned");
                    Err(reason.into())
                }
            }
        })
    }
}

/// Layer producing [`Deadline`] services.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineLayer {
    limit: Duration,
}

impl DeadlineLayer {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = Deadline<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Deadline::new(inner, self.limit)
    }
}

/// Bound every call to `inner` by `limit`.
pub fn deadline<S>(inner: S, limit: Duration) -> Deadline<S> {
    Deadline::new(inner, limit)
}

/// Per-call deadline around an inner effector.
#[derive(Clone)]
pub struct Deadline<S> {
    inner: S,
    limit: Duration,
}

impl<S> Deadline<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

impl<S> Service<Context> for Deadline<S>
where
    S: Effector,
    S::Future: Send + 'static,
{
    type Response = String;
    type Error = EffectorError;
    type Future = EffectorFuture;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Context) -> Self::Future {
        let limit = self.limit;
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let bounded = Context::with_timeout(&ctx, limit);
            if let Some(reason) = bounded.err() {
                return Err(reason.into());
            }
            tokio::select! {
                result = invoke(&mut inner, &bounded) => result,
                reason = bounded.done() => {
                    debug!(?limit, %reason, "deadline reached");
                    Err(reason.into())
                }
            }
        })
    }
}
