//! # Cancellation contexts
//!
//! A [`Context`] is the cancellation handle every effector receives. It can
//! carry a deadline, an explicit cancel signal, or both, and it chains to a
//! parent: a child fires when its own deadline passes, when its
//! [`CancelHandle`] is used, or when any ancestor fires. Clones are cheap and
//! observe the same state.
//!
//! ```rust
//! use std::time::Duration;
//! use tower_effector::context::Context;
//!
//! # async fn example() {
//! let root = Context::background();
//! let (ctx, handle) = Context::with_cancel(&root);
//! let bounded = Context::with_timeout(&ctx, Duration::from_secs(5));
//!
//! handle.cancel();
//! assert!(bounded.err().is_some());
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::ContextError;

/// Cancellation handle passed to every effector call.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parent: Option<Context>,
    deadline: Option<Instant>,
    fired: watch::Sender<Option<ContextError>>,
}

/// Cancels the [`Context`] it was created with. Dropping it does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    ctx: Context,
}

impl Context {
    fn new(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        let (fired, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                parent,
                deadline,
                fired,
            }),
        }
    }

    /// Root context: no deadline, never cancelled.
    pub fn background() -> Self {
        Self::new(None, None)
    }

    pub fn with_cancel(parent: &Context) -> (Self, CancelHandle) {
        let ctx = Self::new(Some(parent.clone()), parent.deadline());
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    pub fn with_timeout(parent: &Context, timeout: Duration) -> Self {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    /// Child that fires at `deadline` or when `parent` fires, whichever is
    /// first. The effective deadline never outlives the parent's.
    pub fn with_deadline(parent: &Context, deadline: Instant) -> Self {
        let effective = match parent.deadline() {
            Some(inherited) if inherited < deadline => inherited,
            _ => deadline,
        };
        Self::new(Some(parent.clone()), Some(effective))
    }

    /// Cancellable child with a deadline.
    pub fn with_timeout_and_cancel(parent: &Context, timeout: Duration) -> (Self, CancelHandle) {
        let ctx = Self::with_timeout(parent, timeout);
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Reason this context fired, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(reason) = *self.inner.fired.borrow() {
            return Some(reason);
        }
        if let Some(reason) = self.inner.parent.as_ref().and_then(Context::err) {
            return Some(self.fire(reason));
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(self.fire(ContextError::DeadlineExceeded))
            }
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once this context fires, yielding the reason.
    pub fn done(&self) -> BoxFuture<'static, ContextError> {
        let ctx = self.clone();
        async move {
            if let Some(reason) = ctx.err() {
                return reason;
            }
            let mut rx = ctx.inner.fired.subscribe();
            let parent = ctx.inner.parent.clone();
            let deadline = ctx.inner.deadline;

            let own = async move {
                let fired = rx.wait_for(Option::is_some).await.ok().and_then(|r| *r);
                match fired {
                    Some(reason) => reason,
                    None => std::future::pending::<ContextError>().await,
                }
            };
            let inherited = async move {
                match parent {
                    Some(parent) => parent.done().await,
                    None => std::future::pending::<ContextError>().await,
                }
            };
            let timer = async move {
                match deadline {
                    Some(deadline) => {
                        sleep_until(deadline).await;
                        ContextError::DeadlineExceeded
                    }
                    None => std::future::pending::<ContextError>().await,
                }
            };

            let reason = tokio::select! {
                reason = own => reason,
                reason = inherited => reason,
                reason = timer => reason,
            };
            ctx.fire(reason)
        }
        .boxed()
    }

    /// Records `reason` unless an earlier one is already set; returns the
    /// reason that sticks.
    fn fire(&self, reason: ContextError) -> ContextError {
        let mut sticky = reason;
        self.inner.fired.send_if_modified(|current| match current {
            Some(existing) => {
                sticky = *existing;
                false
            }
            None => {
                *current = Some(reason);
                true
            }
        });
        sticky
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.ctx.fire(ContextError::Canceled);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").field("ctx", &self.ctx).finish()
    }
}
