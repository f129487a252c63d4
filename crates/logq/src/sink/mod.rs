//! Sink — where serialized records end up.
//!
//! Workers only see the [`Sink`] trait. `redis.rs` is the production
//! implementation (LPUSH onto a Redis list); `fake.rs` is an in-memory
//! test double.

pub mod error;
pub mod fake;
pub mod redis;
pub mod traits;

pub use error::SinkError;
pub use fake::FakeSink;
pub use self::redis::RedisSink;
pub use traits::{Sink, SinkFuture};
