//! Fan-out: one receiver split across competing outputs

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Spread `source` over `n` outputs.
///
/// `n` workers compete for the source, so each value reaches exactly one
/// output. All outputs close once the source is drained and closed. A worker
/// whose output is dropped stops pulling; the value it held is lost.
pub fn split<T>(source: mpsc::Receiver<T>, n: usize) -> Vec<mpsc::Receiver<T>>
where
    T: Send + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let mut dests = Vec::with_capacity(n);

    for worker in 0..n {
        let (tx, rx) = mpsc::channel(1);
        dests.push(rx);
        let source = source.clone();
        tokio::spawn(async move {
            loop {
                // lock is released before forwarding
                let next = source.lock().await.recv().await;
                let Some(value) = next else { return };
                if tx.send(value).await.is_err() {
                    trace!(worker, "split output dropped");
                    return;
                }
            }
        });
    }

    dests
}
