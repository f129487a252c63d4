//! Fake — test double for the list store.
//!
//! [`FakeSink`] implements [`Sink`] with in-memory state so the worker
//! pool and the whole pipeline can be tested without a Redis server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use super::error::SinkError;
use super::traits::{Sink, SinkFuture};

type FailurePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// An in-memory list store.
///
/// Every successful append is pushed onto the front of the list stored
/// under its key, matching LPUSH semantics.
pub struct FakeSink {
    lists: Mutex<HashMap<String, Vec<String>>>,
    fail_when: Option<FailurePredicate>,
    reachable: bool,
    latency: Option<Duration>,
    attempts: AtomicUsize,
}

impl FakeSink {
    /// A store that accepts everything.
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            fail_when: None,
            reachable: true,
            latency: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Reject every append whose payload matches `predicate`.
    pub fn failing_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Make `ping` fail.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Delay every append by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Current contents of the list at `key`, newest first.
    pub async fn list(&self, key: &str) -> Vec<String> {
        self.lists.lock().await.get(key).cloned().unwrap_or_default()
    }

    /// All stored payloads across every key.
    pub async fn payloads(&self) -> Vec<String> {
        self.lists.lock().await.values().flatten().cloned().collect()
    }

    /// Number of append calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FakeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for FakeSink {
    fn ping(&self) -> SinkFuture<'_, String> {
        Box::pin(async move {
            if self.reachable {
                Ok("PONG".to_string())
            } else {
                Err(SinkError::ConnectionFailed("fake sink is unreachable".to_string()))
            }
        })
    }

    fn append<'a>(&'a self, key: &'a str, payload: String) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(predicate) = &self.fail_when {
                if predicate(&payload) {
                    return Err(SinkError::Rejected {
                        key: key.to_string(),
                        reason: "rejected by fake sink".to_string(),
                    });
                }
            }
            self.lists
                .lock()
                .await
                .entry(key.to_string())
                .or_default()
                .insert(0, payload);
            Ok(())
        })
    }
}
