//! Debounce: collapse bursts of calls into one inner invocation
//!
//! Two flavours:
//! - [`DebounceFirst`] runs the first call of a burst and hands its result to
//!   every call that arrives within `window` of that call returning.
//! - [`DebounceLast`] waits for the burst to go quiet for `window`, then runs
//!   the inner service once in the background. Callers never wait for it;
//!   they get whatever result is cached at the time, which is empty until
//!   the first burst settles.

use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tower::{Layer, Service};
use tracing::debug;

use crate::context::Context;
use crate::effector::{invoke, Effector, EffectorFuture};
use crate::error::{EffectorError, Result};

// ===== First-wins =====

#[derive(Debug, Default)]
struct FirstState {
    threshold: Option<Instant>,
    cached: Option<Result<String>>,
}

/// Layer producing [`DebounceFirst`] services.
#[derive(Debug, Clone, Copy)]
pub struct DebounceFirstLayer {
    window: Duration,
}

impl DebounceFirstLayer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl<S> Layer<S> for DebounceFirstLayer {
    type Service = DebounceFirst<S>;
    fn layer(&self, inner: S) -> Self::Service {
        DebounceFirst::new(inner, self.window)
    }
}

/// Run the first call of each burst and replay its result for `window`.
pub fn debounce_first<S>(inner: S, window: Duration) -> DebounceFirst<S> {
    DebounceFirst::new(inner, window)
}

/// First-wins debouncer around an inner effector.
#[derive(Clone)]
pub struct DebounceFirst<S> {
    inner: S,
    window: Duration,
    state: Arc<Mutex<FirstState>>,
}

impl<S> DebounceFirst<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            state: Arc::new(Mutex::new(FirstState::default())),
        }
    }
}

impl<S> Service<Context> for DebounceFirst<S>
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
        let window = self.window;
        let state = self.state.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            // Held across the inner call: overlapping calls wait for the
            // result instead of racing a second invocation.
            let mut s = state.lock().await;
            if let (Some(threshold), Some(cached)) = (s.threshold, &s.cached) {
                if Instant::now() < threshold {
                    return cached.clone();
                }
            }

            let result = invoke(&mut inner, &ctx).await;
            s.threshold = Some(Instant::now() + window);
            s.cached = Some(result.clone());
            result
        })
    }
}

// ===== Last-wins =====

#[derive(Debug)]
struct LastState {
    threshold: Instant,
    cached: Option<Result<String>>,
    watching: bool,
}

/// Layer producing [`DebounceLast`] services.
#[derive(Debug, Clone, Copy)]
pub struct DebounceLastLayer {
    window: Duration,
}

impl DebounceLastLayer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl<S> Layer<S> for DebounceLastLayer {
    type Service = DebounceLast<S>;
    fn layer(&self, inner: S) -> Self::Service {
        DebounceLast::new(inner, self.window)
    }
}

/// Run the inner effector once each burst has been quiet for `window`.
pub fn debounce_last<S>(inner: S, window: Duration) -> DebounceLast<S> {
    DebounceLast::new(inner, window)
}

/// Last-wins debouncer around an inner effector.
#[derive(Clone)]
pub struct DebounceLast<S> {
    inner: S,
    window: Duration,
    state: Arc<Mutex<LastState>>,
}

impl<S> DebounceLast<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            state: Arc::new(Mutex::new(LastState {
                threshold: Instant::now(),
                cached: None,
                watching: false,
            })),
        }
    }

    /// Result of the most recent background invocation, if any.
    pub async fn latest(&self) -> Option<Result<String>> {
        self.state.lock().await.cached.clone()
    }

    /// Whether a burst is still waiting to settle.
    pub async fn is_pending(&self) -> bool {
        self.state.lock().await.watching
    }
}

async fn watch<S>(state: Arc<Mutex<LastState>>, mut inner: S, ctx: Context)
where
    S: Effector,
    S::Future: Send + 'static,
{
    let mut done = ctx.done();
    loop {
        let threshold = state.lock().await.threshold;

        if Instant::now() < threshold {
            tokio::select! {
                reason = &mut done => {
                    debug!(%reason, "debounce watcher cancelled");
                    let mut s = state.lock().await;
                    s.cached = Some(Err(reason.into()));
                    s.watching = false;
                    return;
                }
                _ = sleep_until(threshold) => continue,
            }
        }

        if let Some(reason) = ctx.err() {
            let mut s = state.lock().await;
            s.cached = Some(Err(reason.into()));
            s.watching = false;
            return;
        }

        debug!("debounce window closed, invoking");
        let result = invoke(&mut inner, &ctx).await;

        let mut s = state.lock().await;
        s.cached = Some(result);
        // A call that landed while inner was running opened a new burst.
        if s.threshold > threshold {
            continue;
        }
        s.watching = false;
        return;
    }
}

impl<S> Service<Context> for DebounceLast<S>
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
        let window = self.window;
        let state = self.state.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut s = state.lock().await;
            s.threshold = Instant::now() + window;
            if !s.watching {
                s.watching = true;
                tokio::spawn(watch(state.clone(), inner, ctx));
            }
            s.cached.clone().unwrap_or_else(|| Ok(String::new()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::{boxed, effector_fn, BoxEffector};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting(calls: Arc<AtomicUsize>) -> BoxEffector {
        boxed(effector_fn(move |_ctx: Context| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("call {}", n)) }
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn first_burst_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut svc = debounce_first(counting(calls.clone()), Duration::from_secs(1));
        let ctx = Context::background();

        for _ in 0..100 {
            assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "call 0");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_window_expires_and_caches_errors_too() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = boxed(effector_fn(move |_ctx: Context| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(EffectorError::msg("cold start"))
                } else {
                    Ok("warm".to_string())
                }
            }
        }));
        let mut svc = DebounceFirstLayer::new(Duration::from_millis(100)).layer(inner);
        let ctx = Context::background();

        assert_eq!(invoke(&mut svc, &ctx).await.unwrap_err().to_string(), "cold start");
        sleep(Duration::from_millis(50)).await;
        assert_eq!(invoke(&mut svc, &ctx).await.unwrap_err().to_string(), "cold start");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "warm");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_burst_runs_once_after_quiet_period() {
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_secs(1);
        let mut svc = debounce_last(counting(calls.clone()), window);
        let ctx = Context::background();

        for _ in 0..100 {
            // nothing has settled yet, so callers see an empty result
            assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(svc.is_pending().await);

        sleep(window / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sleep(window * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!svc.is_pending().await);
        assert_eq!(svc.latest().await.unwrap().unwrap(), "call 0");
    }

    #[tokio::test(start_paused = true)]
    async fn last_calls_extend_the_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_millis(100);
        let mut svc = debounce_last(counting(calls.clone()), window);
        let ctx = Context::background();

        for _ in 0..5 {
            let _ = invoke(&mut svc, &ctx).await;
            sleep(Duration::from_millis(60)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a later burst re-arms the watcher and fires again
        assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "call 0");
        sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(svc.latest().await.unwrap().unwrap(), "call 1");
    }

    #[tokio::test(start_paused = true)]
    async fn last_call_during_a_running_invocation_opens_a_new_burst() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let slow = boxed(effector_fn(move |_ctx: Context| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(100)).await;
                Ok(format!("call {}", n))
            }
        }));
        let mut svc = debounce_last(slow, Duration::from_millis(50));
        let ctx = Context::background();

        let _ = invoke(&mut svc, &ctx).await;
        // the watcher fired at 50ms and inner is still running
        sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "");
        assert!(svc.is_pending().await);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!svc.is_pending().await);
        assert_eq!(svc.latest().await.unwrap().unwrap(), "call 1");
    }

    #[tokio::test(start_paused = true)]
    async fn last_cancelled_watcher_stores_the_error_without_invoking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut svc = debounce_last(counting(calls.clone()), Duration::from_millis(100));
        let (ctx, handle) = Context::with_cancel(&Context::background());

        let _ = invoke(&mut svc, &ctx).await;
        sleep(Duration::from_millis(10)).await;
        handle.cancel();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(svc.latest().await.unwrap().unwrap_err().is_cancellation());
        assert!(!svc.is_pending().await);

        let err = invoke(&mut svc, &Context::background()).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}
