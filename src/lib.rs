//! # tower-effector
//!
//! Resilience decorators for cancellable, fallible operations, built on
//! Tower's service architecture.
//!
//! ## Core Concepts
//!
//! - **Effector**: a Tower service that takes a [`Context`] and returns a
//!   `String` or an [`EffectorError`]
//! - **Context**: a cancellation handle with an optional deadline, chained to
//!   its parent
//! - **Decorators**: circuit breaker, retry, throttle, debounce (first and
//!   last) and deadline layers; each consumes and produces an effector, so
//!   they nest in any order
//! - **Shared state**: decorator clones share their breaker counters, token
//!   buckets and debounce caches
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tower_effector::config::ConfigBuilder;
//! use tower_effector::resilience::pipeline;
//! use tower_effector::{effector_fn, invoke, Context};
//!
//! # async fn example() -> tower_effector::Result<()> {
//! let quote = effector_fn(|_ctx: Context| async { Ok("42.17".to_string()) });
//!
//! let cfg = ConfigBuilder::new()
//!     .breaker_threshold(3)
//!     .retries(2)
//!     .retry_delay(Duration::from_millis(200))
//!     .throttle(5, 1, Duration::from_secs(1))
//!     .timeout(Duration::from_secs(2))
//!     .build();
//! let mut svc = pipeline(quote, &cfg);
//!
//! let price = invoke(&mut svc, &Context::background()).await?;
//! println!("price: {}", price);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod effector;
pub mod error;
pub mod observability;
pub mod plumbing;
pub mod resilience;

pub use context::{CancelHandle, Context};
pub use effector::{boxed, effector_fn, invoke, BoxEffector, Effector, EffectorFuture};
pub use error::{ContextError, EffectorError, Result};

pub use tower::{Layer, Service, ServiceBuilder, ServiceExt};
