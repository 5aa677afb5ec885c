//! Canonical decorator stack built from [`ResilienceConfig`]
//!
//! Layers from the outside in:
//! `DebounceLast? -> Deadline? -> Retry -> CircuitBreaker -> Throttle -> DebounceFirst? -> base`.
//!
//! Retry sits outside the breaker so every attempt is counted and gated; the
//! throttle sits inside it so a rejected call spends no token. An optional
//! deadline bounds the whole call including retry waits.
//!
//! Debounce-last goes outermost: its watcher outlives the call that started
//! it, so it must see the caller's context rather than the per-call deadline.
//! Each background invocation is still bounded by the deadline below it.

use tower::{Layer, ServiceBuilder};
use tracing::debug;

use crate::config::{DebounceMode, ResilienceConfig};
use crate::effector::{boxed, BoxEffector, Effector};

use super::breaker::CircuitBreakerLayer;
use super::debounce::{DebounceFirstLayer, DebounceLastLayer};
use super::retry::RetryLayer;
use super::throttle::ThrottleLayer;
use super::timeout::DeadlineLayer;

/// Wrap `base` in the decorators described by `cfg`.
pub fn pipeline<S>(base: S, cfg: &ResilienceConfig) -> BoxEffector
where
    S: Effector,
    S::Future: Send + 'static,
{
    let base = match cfg.debounce {
        Some(d) if d.mode == DebounceMode::First => {
            boxed(DebounceFirstLayer::new(d.window).layer(base))
        }
        _ => boxed(base),
    };

    let guarded = ServiceBuilder::new()
        .layer(RetryLayer::new(cfg.retry))
        .layer(CircuitBreakerLayer::new(cfg.breaker))
        .layer(ThrottleLayer::new(cfg.throttle))
        .service(base);

    debug!(
        retries = cfg.retry.retries,
        threshold = cfg.breaker.threshold,
        max_tokens = cfg.throttle.max,
        debounce = ?cfg.debounce.map(|d| d.mode),
        timeout = ?cfg.timeout,
        "pipeline built"
    );

    let bounded = match cfg.timeout {
        Some(limit) => boxed(DeadlineLayer::new(limit).layer(guarded)),
        None => boxed(guarded),
    };

    match cfg.debounce {
        Some(d) if d.mode == DebounceMode::Last => {
            boxed(DebounceLastLayer::new(d.window).layer(bounded))
        }
        _ => bounded,
    }
}
