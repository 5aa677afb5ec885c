//! Fan-in: many receivers onto one

use tokio::sync::mpsc;
use tracing::trace;

/// Forward every value from every source to a single receiver.
///
/// The returned receiver closes once all sources have closed. Values from one
/// source keep their order; interleaving across sources is unspecified.
pub fn funnel<T>(sources: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (dest, out) = mpsc::channel(sources.len().max(1));

    for (index, mut source) in sources.into_iter().enumerate() {
        let dest = dest.clone();
        tokio::spawn(async move {
            while let Some(value) = source.recv().await {
                if dest.send(value).await.is_err() {
                    trace!(index, "funnel output dropped");
                    return;
                }
            }
        });
    }

    out
}
