//! Resilience layers: circuit breaker, retry, throttle, debounce, timeout
//!
//! What this module provides
//! - Stateful Tower middleware that turns an effector into another effector
//!
//! Exports
//! - Layers
//!   - `CircuitBreakerLayer(BreakerConfig)` (exponential backoff past a failure threshold)
//!   - `RetryLayer(RetryConfig)` (fixed delay, cancellable between attempts)
//!   - `ThrottleLayer(ThrottleConfig)` (token bucket with a lazily started refiller)
//!   - `DebounceFirstLayer(Duration)` / `DebounceLastLayer(Duration)`
//!   - `DeadlineLayer(Duration)` (bounds one call of an effector)
//! - Functions
//!   - `breaker`, `retry`, `throttle`, `debounce_first`, `debounce_last`, `deadline`
//!     for nesting without a builder
//!   - `timeout(slow_fn)` wraps a blocking `Fn(String) -> Result<String>`
//!   - `pipeline(base, &ResilienceConfig)` builds the canonical stack
//!
//! Implementation strategy
//! - Each service keeps its state behind an `Arc`, so clones share it
//! - Inner services are cloned per call and driven with `ready().call()`
//! - Every wait is a `tokio::select!` against `Context::done()`
//!
//! Composition
//! - `retry(breaker(throttle(base, 10, 1, period), 5), 3, delay)`
//! - `ServiceBuilder::new().layer(DeadlineLayer::new(d)).layer(RetryLayer::new(cfg)).service(base)`

pub mod breaker;
pub mod debounce;
pub mod pipeline;
pub mod retry;
pub mod throttle;
pub mod timeout;

pub use breaker::{breaker, CircuitBreaker, CircuitBreakerLayer};
pub use debounce::{
    debounce_first, debounce_last, DebounceFirst, DebounceFirstLayer, DebounceLast,
    DebounceLastLayer,
};
pub use pipeline::pipeline;
pub use retry::{retry, Retry, RetryLayer};
pub use throttle::{throttle, Throttle, ThrottleLayer};
pub use timeout::{deadline, timeout, Deadline, DeadlineLayer, SlowOperation, Timeout};
