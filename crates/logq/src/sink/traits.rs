//! Sink trait — abstract interface over the durable list store.

use std::future::Future;
use std::pin::Pin;

use super::error::SinkError;

pub type SinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SinkError>> + Send + 'a>>;

/// A durable, list-backed store that records are appended to.
///
/// Object-safe thanks to `Pin<Box<…>>` returns. Implementations must be
/// `Send + Sync`: every worker calls `append` on the same shared handle
/// concurrently.
pub trait Sink: Send + Sync {
    /// Liveness check, run once at startup. Returns the server's reply.
    fn ping(&self) -> SinkFuture<'_, String>;

    /// Append one serialized record to the list stored at `key`.
    fn append<'a>(&'a self, key: &'a str, payload: String) -> SinkFuture<'a, ()>;
}
