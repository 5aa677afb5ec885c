//! A value that a producer delivers once and any number of readers await

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, OnceCell};

use crate::context::Context;
use crate::effector::{boxed, effector_fn, BoxEffector};
use crate::error::{EffectorError, Result};

/// Placeholder for a result still being produced elsewhere.
///
/// The first reader waits for the producer; the result is then cached and
/// every later (or concurrent) reader gets a clone of it.
#[derive(Clone)]
pub struct Deferred {
    shared: Arc<Shared>,
}

struct Shared {
    rx: Mutex<Option<oneshot::Receiver<Result<String>>>>,
    value: OnceCell<Result<String>>,
}

impl Deferred {
    /// Wrap the receiving end of a producer's oneshot.
    pub fn new(rx: oneshot::Receiver<Result<String>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                rx: Mutex::new(Some(rx)),
                value: OnceCell::new(),
            }),
        }
    }

    /// Run `fut` on the runtime and defer its output.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
        Self::new(rx)
    }

    pub fn is_ready(&self) -> bool {
        self.shared.value.initialized()
    }

    /// Wait for the producer's value.
    pub async fn result(&self) -> Result<String> {
        self.shared
            .value
            .get_or_init(|| async {
                let mut slot = self.shared.rx.lock().await;
                let outcome = match slot.as_mut() {
                    Some(rx) => rx.await.ok(),
                    None => None,
                };
                slot.take();
                outcome.unwrap_or_else(|| Err(EffectorError::msg("producer dropped")))
            })
            .await
            .clone()
    }

    /// Expose the deferred value as an effector that gives up when the
    /// caller's context fires.
    pub fn effector(&self) -> BoxEffector {
        let deferred = self.clone();
        boxed(effector_fn(move |ctx: Context| {
            let deferred = deferred.clone();
            async move {
                tokio::select! {
                    result = deferred.result() => result,
                    reason = ctx.done() => Err(reason.into()),
                }
            }
        }))
    }
}
