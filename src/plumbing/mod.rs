//! Plumbing: channel and state primitives that sit next to the decorators
//!
//! What this module provides
//! - Small concurrency building blocks with no policy of their own
//!
//! Exports
//! - `fan_in::funnel(sources)` merges many `mpsc` receivers into one
//! - `fan_out::split(source, n)` spreads one receiver over `n` competing outputs
//! - `future::Deferred` caches the single value of a producer for every reader,
//!   and can be exposed as an effector
//! - `sharding::ShardedMap<V>` partitions a string-keyed map over independently
//!   locked shards
//!
//! Implementation strategy
//! - Forwarders and workers are `tokio::spawn`ed tasks; an output closes when
//!   every task feeding it has finished
//! - The sharded map uses `parking_lot::RwLock` per shard and SHA-1 for shard
//!   selection

pub mod fan_in;
pub mod fan_out;
pub mod future;
pub mod sharding;

pub use fan_in::funnel;
pub use fan_out::split;
pub use future::Deferred;
pub use sharding::ShardedMap;
