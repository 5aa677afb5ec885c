use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;
use tracing::{error, info};

use tower_effector::config::{self, ResilienceConfig};
use tower_effector::observability::{init_tracing, TracingLayer};
use tower_effector::resilience::{debounce_first, pipeline, timeout};
use tower_effector::{boxed, effector_fn, invoke, BoxEffector, Context, EffectorError, ServiceExt};

/// A remote call that fails twice out of every three attempts.
fn flaky_quote(calls: Arc<AtomicUsize>) -> BoxEffector {
    boxed(effector_fn(move |_ctx: Context| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n % 3 == 2 {
                Ok(format!("quote #{}", n))
            } else {
                Err(EffectorError::msg(format!("upstream hiccup on call {}", n)))
            }
        }
    }))
}

fn load_config() -> ResilienceConfig {
    match env::args().nth(1) {
        Some(path) => match config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(%path, error = %e, "falling back to environment configuration");
                config::from_env()
            }
        },
        None => config::from_env(),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cfg = load_config();
    info!(?cfg, "configuration loaded");

    // Pipeline over a flaky upstream
    let calls = Arc::new(AtomicUsize::new(0));
    let mut quotes = ServiceBuilder::new()
        .layer(TracingLayer::new("quote"))
        .service(pipeline(flaky_quote(calls.clone()), &cfg));
    let root = Context::background();
    for round in 0..3 {
        match invoke(&mut quotes, &root).await {
            Ok(quote) => info!(round, %quote, "pipeline call succeeded"),
            Err(e) => error!(round, error = %e, "pipeline call failed"),
        }
    }
    info!(upstream_calls = calls.load(Ordering::SeqCst), "pipeline demo finished");

    // Debounce: a burst of ten calls hits the upstream once
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut refresh = debounce_first(
        effector_fn(move |_ctx: Context| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("refresh {}", n)) }
        }),
        Duration::from_millis(500),
    );
    for _ in 0..10 {
        let _ = invoke(&mut refresh, &root).await;
    }
    info!(upstream_calls = hits.load(Ordering::SeqCst), "debounce demo finished");

    // Timeout: a blocking job that outlives its deadline
    let report = timeout(|name: String| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(format!("report for {}", name))
    });
    let ctx = Context::with_timeout(&root, Duration::from_millis(100));
    match report.oneshot((ctx, "q3".to_string())).await {
        Ok(out) => info!(%out, "report finished in time"),
        Err(e) => info!(error = %e, "report abandoned"),
    }
}
