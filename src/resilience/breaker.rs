//! Circuit breaker with exponential backoff
//!
//! The breaker counts consecutive failures. Up to `threshold` of them, calls
//! pass straight through. Past it, a call is rejected with
//! [`EffectorError::ServiceUnreachable`] until `base_backoff * 2^overflow`
//! has elapsed since the last attempt, where `overflow` is how far the
//! streak has gone past the threshold. One success resets the streak.

use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::BreakerConfig;
use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    last_attempt: Instant,
}

impl BreakerState {
    /// Instant before which calls are rejected, if the breaker is backing off.
    fn retry_at(&self, cfg: &BreakerConfig) -> Option<Option<Instant>> {
        let overflow = self.consecutive_failures.saturating_sub(cfg.threshold);
        if overflow == 0 {
            return None;
        }
        // `None` inside means the deadline is beyond what `Instant` can hold.
        Some(self.last_attempt.checked_add(cfg.backoff(overflow)))
    }
}

/// Layer producing [`CircuitBreaker`] services.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerLayer {
    cfg: BreakerConfig,
}

impl CircuitBreakerLayer {
    pub fn new(cfg: BreakerConfig) -> Self {
        Self { cfg }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;
    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreaker::new(inner, self.cfg)
    }
}

/// Wrap `inner` in a breaker with the default 2s backoff unit.
pub fn breaker<S>(inner: S, threshold: u32) -> CircuitBreaker<S> {
    CircuitBreaker::new(inner, BreakerConfig::new(threshold))
}

/// Circuit breaker around an inner effector.
#[derive(Clone)]
pub struct CircuitBreaker<S> {
    inner: S,
    cfg: BreakerConfig,
    state: Arc<RwLock<BreakerState>>,
}

impl<S> CircuitBreaker<S> {
    pub fn new(inner: S, cfg: BreakerConfig) -> Self {
        Self {
            inner,
            cfg,
            state: Arc::new(RwLock::new(BreakerState {
                consecutive_failures: 0,
                last_attempt: Instant::now(),
            })),
        }
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.read().await.consecutive_failures
    }
}

impl<S> Service<Context> for CircuitBreaker<S>
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
        let state = self.state.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            {
                let s = state.read().await;
                match s.retry_at(&cfg) {
                    Some(Some(retry_at)) if Instant::now() <= retry_at => {
                        debug!(
                            failures = s.consecutive_failures,
                            wait = ?retry_at.saturating_duration_since(Instant::now()),
                            "circuit open, rejecting call"
                        );
                        return Err(EffectorError::ServiceUnreachable);
                    }
                    Some(None) => return Err(EffectorError::ServiceUnreachable),
                    _ => {}
                }
            }

            let result = invoke(&mut inner, &ctx).await;

            let mut s = state.write().await;
            s.last_attempt = Instant::now();
            match &result {
                Ok(_) => {
                    if s.consecutive_failures > 0 {
                        debug!(failures = s.consecutive_failures, "circuit reset");
                    }
                    s.consecutive_failures = 0;
                }
                Err(e) => {
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                    if s.consecutive_failures > cfg.threshold {
                        warn!(
                            failures = s.consecutive_failures,
                            threshold = cfg.threshold,
                            backoff = ?cfg.backoff(s.consecutive_failures - cfg.threshold),
                            error = %e,
                            "circuit open"
                        );
                    }
                }
            }
            result
        })
    }
}
