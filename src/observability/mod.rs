//! Observability: tracing and outcome metrics for effectors
//!
//! What this module provides
//! - Structured tracing and outcome counters around effector calls
//!
//! Exports
//! - Models
//!   - `MetricRecord::{Counter{name, value}, Histogram{name, value}}`
//!   - `Outcome` (how a call ended, as a metric name)
//! - Layers
//!   - `TracingLayer` creating an `effector` span tagged with a layer name
//!   - `MetricsLayer<C>` where `C: MetricsCollector`
//! - Services
//!   - `MetricsCollector: Service<MetricRecord, Response=()>`
//! - Functions
//!   - `init_tracing()` installs a `tracing-subscriber` fmt subscriber
//!
//! Implementation strategy
//! - `TracingLayer` instruments the inner future with `tracing::info_span`
//!   and logs the outcome and elapsed time when it resolves
//! - `MetricsLayer` reports one counter per call keyed by [`Outcome`] plus a
//!   latency histogram in microseconds; collectors cannot fail
//!
//! Composition
//! - `ServiceBuilder::new().layer(TracingLayer::new("quote")).layer(MetricsLayer::new(collector)).service(effector)`

use std::convert::Infallible;
use std::task::{Context as TaskContext, Poll};

use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricRecord {
    Counter { name: &'static str, value: u64 },
    Histogram { name: &'static str, value: u64 },
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Unreachable,
    Throttled,
    Cancelled,
    Failed,
}

impl Outcome {
    pub fn of(result: &Result<String>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(EffectorError::ServiceUnreachable) => Self::Unreachable,
            Err(EffectorError::Throttled) => Self::Throttled,
            Err(EffectorError::Context(_)) => Self::Cancelled,
            Err(EffectorError::Inner(_)) => Self::Failed,
        }
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            Self::Success => "calls_succeeded",
            Self::Unreachable => "calls_unreachable",
            Self::Throttled => "calls_throttled",
            Self::Cancelled => "calls_cancelled",
            Self::Failed => "calls_failed",
        }
    }
}

pub trait MetricsCollector: Service<MetricRecord, Response = (), Error = Infallible> {}
impl<T> MetricsCollector for T where T: Service<MetricRecord, Response = (), Error = Infallible> {}

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Layer that adds a span around every call.
#[derive(Debug, Clone, Copy)]
pub struct TracingLayer {
    name: &'static str,
}

impl TracingLayer {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[derive(Clone)]
pub struct Tracing<S> {
    inner: S,
    name: &'static str,
}

impl<S> Layer<S> for TracingLayer {
    type Service = Tracing<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Tracing {
            inner,
            name: self.name,
        }
    }
}

impl<S> Service<Context> for Tracing<S>
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
        let name = self.name;
        let mut inner = self.inner.clone();
        let span = info_span!("effector", layer = name, deadline = ?ctx.deadline());
        Box::pin(
            async move {
                let started = Instant::now();
                let result = invoke(&mut inner, &ctx).await;
                let elapsed = started.elapsed();
                match &result {
                    Ok(out) => info!(?elapsed, bytes = out.len(), "call succeeded"),
                    Err(e) => warn!(?elapsed, outcome = ?Outcome::of(&result), error = %e, "call failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Layer that reports call outcomes to an injected collector.
#[derive(Clone)]
pub struct MetricsLayer<C> {
    collector: C,
}

impl<C> MetricsLayer<C> {
    pub fn new(collector: C) -> Self {
        Self { collector }
    }
}

#[derive(Clone)]
pub struct Metrics<S, C> {
    inner: S,
    collector: C,
}

impl<S, C> Layer<S> for MetricsLayer<C>
where
    C: Clone,
{
    type Service = Metrics<S, C>;
    fn layer(&self, inner: S) -> Self::Service {
        Metrics {
            inner,
            collector: self.collector.clone(),
        }
    }
}

impl<S, C> Service<Context> for Metrics<S, C>
where
    S: Effector,
    S::Future: Send + 'static,
    C: MetricsCollector + Clone + Send + 'static,
    C::Future: Send + 'static,
{
    type Response = String;
    type Error = EffectorError;
    type Future = EffectorFuture;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Context) -> Self::Future {
        let mut inner = self.inner.clone();
        let mut collector = self.collector.clone();
        Box::pin(async move {
            let started = Instant::now();
            let result = invoke(&mut inner, &ctx).await;
            let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

            let records = [
                MetricRecord::Counter {
                    name: Outcome::of(&result).metric_name(),
                    value: 1,
                },
                MetricRecord::Histogram {
                    name: "call_latency_us",
                    value: micros,
                },
            ];
            for record in records {
                let ready = match collector.ready().await {
                    Ok(ready) => ready,
                    Err(never) => match never {},
                };
                match ready.call(record).await {
                    Ok(()) => {}
                    Err(never) => match never {},
                }
            }
            result
        })
    }
}
