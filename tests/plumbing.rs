//! Plumbing primitives working together with each other and with effectors.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tower_effector::plumbing::{funnel, split, Deferred, ShardedMap};
use tower_effector::resilience::retry;
use tower_effector::{invoke, Context};

#[tokio::test]
async fn split_then_funnel_delivers_every_value_once() {
    let (tx, rx) = mpsc::channel(8);
    let outputs = split(rx, 4);
    let mut merged = funnel(outputs);

    tokio::spawn(async move {
        for i in 0..500u32 {
            tx.send(i).await.unwrap();
        }
    });

    let mut seen = HashSet::new();
    while let Some(v) = merged.recv().await {
        assert!(seen.insert(v), "duplicate {}", v);
    }
    assert_eq!(seen.len(), 500);
}

#[tokio::test]
async fn sharded_map_shared_between_tasks() {
    let map = Arc::new(ShardedMap::new(16));
    let writers: Vec<_> = (0..8)
        .map(|w| {
            let map = map.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    map.set(format!("w{}-k{}", w, i), w * 1000 + i);
                }
            })
        })
        .collect();
    for w in writers {
        w.await.unwrap();
    }

    assert_eq!(map.len(), 800);
    assert_eq!(map.get("w7-k99"), Some(7099));
    assert_eq!(map.delete("w0-k0"), Some(0));
    assert!(!map.contains("w0-k0"));
    assert_eq!(map.keys().len(), 799);
}

#[tokio::test(start_paused = true)]
async fn deferred_value_behind_a_retry() {
    let deferred = Deferred::spawn(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok("computed once".to_string())
    });
    let mut svc = retry(deferred.effector(), 2, Duration::from_millis(10));

    let ctx = Context::with_timeout(&Context::background(), Duration::from_secs(1));
    assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "computed once");
    assert_eq!(invoke(&mut svc, &ctx).await.unwrap(), "computed once");
    assert!(deferred.is_ready());
}
