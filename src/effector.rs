//! The effector contract
//!
//! An effector is any Tower service that takes a [`Context`] and yields a
//! `String` or an [`EffectorError`]. Every decorator in
//! [`resilience`](crate::resilience) both consumes and produces one, so
//! decorators nest freely:
//!
//! ```rust
//! use std::time::Duration;
//! use tower_effector::{effector_fn, invoke, Context};
//! use tower_effector::resilience::{breaker, retry, throttle};
//!
//! # async fn example() -> tower_effector::Result<()> {
//! let base = effector_fn(|_ctx: Context| async { Ok("pong".to_string()) });
//! let mut svc = retry(breaker(throttle(base, 10, 1, Duration::from_secs(1)), 3), 2, Duration::from_millis(50));
//!
//! let out = invoke(&mut svc, &Context::background()).await?;
//! assert_eq!(out, "pong");
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use futures::future::BoxFuture;
use tower::util::{BoxCloneService, ServiceFn};
use tower::{service_fn, Service, ServiceExt};

use crate::context::Context;
use crate::error::{EffectorError, Result};

/// Boxed future returned by every decorator.
pub type EffectorFuture = BoxFuture<'static, Result<String>>;

/// Type-erased, clonable effector.
pub type BoxEffector = BoxCloneService<Context, String, EffectorError>;

/// Shorthand bound for services that satisfy the effector contract.
///
/// Clones must share whatever state the service carries; decorators clone
/// their inner service once per call.
pub trait Effector:
    Service<Context, Response = String, Error = EffectorError> + Clone + Send + 'static
{
}

impl<S> Effector for S where
    S: Service<Context, Response = String, Error = EffectorError> + Clone + Send + 'static
{
}

/// Build an effector from an async closure.
pub fn effector_fn<F, Fut>(f: F) -> ServiceFn<F>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    service_fn(f)
}

/// Wait for readiness, then call `svc` once with a clone of `ctx`.
pub async fn invoke<S>(svc: &mut S, ctx: &Context) -> Result<String>
where
    S: Service<Context, Response = String, Error = EffectorError>,
{
    svc.ready().await?.call(ctx.clone()).await
}

pub fn boxed<S>(svc: S) -> BoxEffector
where
    S: Effector,
    S::Future: Send + 'static,
{
    BoxCloneService::new(svc)
}
