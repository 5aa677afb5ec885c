//! Retry with a fixed delay
//!
//! Re-invokes a failing operation up to `retries` more times, sleeping
//! `delay` between attempts. The sleep races the caller's context, so a
//! cancelled call returns immediately instead of finishing its wait. The
//! last attempt's outcome is returned verbatim.

use std::future::Future;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::time::sleep;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

/// Retry an async operation, waiting `cfg.delay` between attempts.
pub async fn retry_async<F, Fut, T>(ctx: &Context, cfg: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        if attempt >= cfg.retries {
            if cfg.retries > 0 {
                warn!(
                    "Max retries ({}) exceeded. Last error: {}",
                    cfg.retries, error
                );
            }
            return Err(error);
        }

        attempt += 1;
        warn!(
            attempt,
            delay = ?cfg.delay,
            error = %error,
            "Attempt {} failed; retrying in {:?}",
            attempt,
            cfg.delay
        );

        tokio::select! {
            _ = sleep(cfg.delay) => {}
            reason = ctx.done() => {
                debug!(attempt, %reason, "retry abandoned");
                return Err(reason.into());
            }
        }
    }
}

/// Layer producing [`Retry`] services.
#[derive(Debug, Clone, Copy)]
pub struct RetryLayer {
    cfg: RetryConfig,
}

impl RetryLayer {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Retry::new(inner, self.cfg)
    }
}

/// Retry `inner` up to `retries` more times, `delay` apart.
pub fn retry<S>(inner: S, retries: usize, delay: Duration) -> Retry<S> {
    Retry::new(inner, RetryConfig { retries, delay })
}

/// Fixed-delay retry around an inner effector.
#[derive(Clone)]
pub struct Retry<S> {
    inner: S,
    cfg: RetryConfig,
}

impl<S> Retry<S> {
    pub fn new(inner: S, cfg: RetryConfig) -> Self {
        Self { inner, cfg }
    }
}

impl<S> Service<Context> for Retry<S>
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
        let cfg = self.cfg;
        let inner = self.inner.clone();
        let attempt_ctx = ctx.clone();
        Box::pin(async move {
            retry_async(&ctx, cfg, move || {
                let mut svc = inner.clone();
                let ctx = attempt_ctx.clone();
                async move { invoke(&mut svc, &ctx).await }
            })
            .await
        })
    }
}
