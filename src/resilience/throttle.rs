//! Token bucket throttle
//!
//! Each call takes one token; an empty bucket rejects the call with
//! [`EffectorError::Throttled`] without touching the inner service. A
//! background refiller adds `refill` tokens every `period`, capped at `max`.
//!
//! The refiller is started lazily by the first call and is bound to that
//! call's context: once the context fires (or the throttle is dropped) the
//! refiller exits and clears its flag, and the next call starts a new one.
//! Periods that passed with no refiller running are credited when the next
//! call restarts it, so a short-lived context never starves the bucket.

use std::sync::{Arc, Weak};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tower::{Layer, Service};
use tracing::{debug, trace};

use crate::config::ThrottleConfig;
use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    refilling: bool,
    last_refill: Instant,
}

impl Bucket {
    /// Credit every whole period since `last_refill`, capped at `max`.
    fn catch_up(&mut self, cfg: &ThrottleConfig, now: Instant) {
        let tick = cfg.tick();
        let elapsed = now.saturating_duration_since(self.last_refill);
        let periods = u32::try_from(elapsed.as_nanos() / tick.as_nanos()).unwrap_or(u32::MAX);
        if periods == 0 {
            return;
        }
        self.tokens = self
            .tokens
            .saturating_add(cfg.refill.saturating_mul(periods))
            .min(cfg.max);
        self.last_refill = tick
            .checked_mul(periods)
            .and_then(|credited| self.last_refill.checked_add(credited))
            .unwrap_or(now);
        trace!(periods, tokens = self.tokens, "idle periods credited");
    }
}

/// Layer producing [`Throttle`] services.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleLayer {
    cfg: ThrottleConfig,
}

impl ThrottleLayer {
    pub fn new(cfg: ThrottleConfig) -> Self {
        Self { cfg }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = Throttle<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Throttle::new(inner, self.cfg)
    }
}

/// Wrap `inner` in a token bucket holding `max` tokens.
pub fn throttle<S>(inner: S, max: u32, refill: u32, period: Duration) -> Throttle<S> {
    Throttle::new(
        inner,
        ThrottleConfig {
            max,
            refill,
            period,
        },
    )
}

/// Token bucket throttle around an inner effector.
#[derive(Clone)]
pub struct Throttle<S> {
    inner: S,
    cfg: ThrottleConfig,
    bucket: Arc<Mutex<Bucket>>,
}

impl<S> Throttle<S> {
    pub fn new(inner: S, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: cfg.max,
                refilling: false,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Tokens currently in the bucket.
    pub async fn available(&self) -> u32 {
        self.bucket.lock().await.tokens
    }

    pub async fn is_refilling(&self) -> bool {
        self.bucket.lock().await.refilling
    }
}

fn spawn_refiller(
    bucket: Weak<Mutex<Bucket>>,
    cfg: ThrottleConfig,
    last_refill: Instant,
    ctx: Context,
) {
    tokio::spawn(async move {
        let period = cfg.tick();
        let mut ticker = interval_at(last_refill + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut done = ctx.done();

        loop {
            tokio::select! {
                reason = &mut done => {
                    debug!(%reason, "throttle refiller stopping");
                    break;
                }
                at = ticker.tick() => {
                    let Some(strong) = bucket.upgrade() else {
                        return;
                    };
                    let mut b = strong.lock().await;
                    b.tokens = b.tokens.saturating_add(cfg.refill).min(cfg.max);
                    b.last_refill = at;
                    trace!(tokens = b.tokens, "bucket refilled");
                }
            }
        }

        if let Some(bucket) = bucket.upgrade() {
            bucket.lock().await.refilling = false;
        }
    });
}

impl<S> Service<Context> for Throttle<S>
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
        let bucket = self.bucket.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }

            {
                let mut b = bucket.lock().await;
                if !b.refilling {
                    b.catch_up(&cfg, Instant::now());
                    b.refilling = true;
                    spawn_refiller(Arc::downgrade(&bucket), cfg, b.last_refill, ctx.clone());
                }
                if b.tokens == 0 {
                    debug!(max = cfg.max, "throttled");
                    return Err(EffectorError::Throttled);
                }
                b.tokens -= 1;
            }

            invoke(&mut inner, &ctx).await
        })
    }
}
