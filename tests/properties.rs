//! Property tests for breaker backoff math and the token bucket bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::runtime::{Builder, Runtime};
use tower_effector::config::BreakerConfig;
use tower_effector::resilience::{breaker, throttle};
use tower_effector::{boxed, effector_fn, invoke, BoxEffector, Context, EffectorError};

fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn counting(calls: Arc<AtomicUsize>, ok: bool) -> BoxEffector {
    boxed(effector_fn(move |_ctx: Context| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if ok {
                Ok("ok".to_string())
            } else {
                Err(EffectorError::msg("down"))
            }
        }
    }))
}

proptest! {
    #[test]
    fn backoff_doubles_with_each_extra_failure(base_ms in 1u64..10_000, overflow in 1u32..20) {
        let cfg = BreakerConfig { threshold: 0, base_backoff: Duration::from_millis(base_ms) };
        prop_assert_eq!(cfg.backoff(overflow + 1), cfg.backoff(overflow) * 2);
        prop_assert_eq!(cfg.backoff(overflow), Duration::from_millis(base_ms) * (1u32 << overflow));
    }

    #[test]
    fn backoff_never_panics_or_shrinks(overflow in 0u32..u32::MAX) {
        let cfg = BreakerConfig::default();
        prop_assert!(cfg.backoff(overflow.saturating_add(1)) >= cfg.backoff(overflow));
    }

    #[test]
    fn breaker_invokes_exactly_threshold_plus_one_times_in_a_burst(threshold in 0u32..20, extra in 1usize..20) {
        let rt = paused_runtime();
        let calls = Arc::new(AtomicUsize::new(0));
        let gated = rt.block_on(async {
            let mut svc = breaker(counting(calls.clone(), false), threshold);
            let ctx = Context::background();
            let mut gated = 0;
            for _ in 0..(threshold as usize + extra) {
                if let Err(EffectorError::ServiceUnreachable) = invoke(&mut svc, &ctx).await {
                    gated += 1;
                }
            }
            gated
        });
        prop_assert_eq!(calls.load(Ordering::SeqCst), threshold as usize + 1);
        prop_assert_eq!(gated, extra - 1);
    }

    #[test]
    fn bucket_never_grants_more_than_max_plus_refills(
        max in 0u32..20,
        refill in 1u32..5,
        periods in 0u32..5,
        attempts_per_period in 1usize..30,
    ) {
        let rt = paused_runtime();
        let calls = Arc::new(AtomicUsize::new(0));
        let period = Duration::from_millis(100);
        let granted = rt.block_on(async {
            let mut svc = throttle(counting(calls.clone(), true), max, refill, period);
            let ctx = Context::background();
            let mut granted = 0usize;
            for round in 0..=periods {
                for _ in 0..attempts_per_period {
                    if invoke(&mut svc, &ctx).await.is_ok() {
                        granted += 1;
                    }
                }
                if round < periods {
                    tokio::time::sleep(period).await;
                }
            }
            granted
        });
        let bound = max as usize + (refill.min(max) as usize) * periods as usize;
        prop_assert!(granted <= bound, "granted {} > bound {}", granted, bound);
        prop_assert_eq!(granted, calls.load(Ordering::SeqCst));
    }
}
