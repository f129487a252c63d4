//! Channel — the multi-consumer queue between the source and the workers.
//!
//! Producers hold a [`DispatchSender`]; every worker holds a clone of the
//! same [`DispatchReceiver`]. The underlying tokio receiver sits behind an
//! async mutex that is held for a single `recv`, so each record goes to
//! exactly one worker. The channel closes once every sender is dropped,
//! and receivers then drain what is left before seeing `None`.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::record::LogRecord;

/// The channel has no receivers left. Carries the record back.
#[derive(Debug, Error)]
#[error("dispatch channel is closed")]
pub struct ChannelClosed(pub LogRecord);

#[derive(Clone)]
enum SenderInner {
    Bounded(mpsc::Sender<LogRecord>),
    Unbounded(mpsc::UnboundedSender<LogRecord>),
}

enum ReceiverInner {
    Bounded(mpsc::Receiver<LogRecord>),
    Unbounded(mpsc::UnboundedReceiver<LogRecord>),
}

#[derive(Clone)]
pub struct DispatchSender {
    inner: SenderInner,
}

#[derive(Clone)]
pub struct DispatchReceiver {
    inner: Arc<Mutex<ReceiverInner>>,
}

/// Create a channel. `capacity == 0` makes it unbounded.
pub fn dispatch_channel(capacity: usize) -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (SenderInner::Unbounded(tx), ReceiverInner::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (SenderInner::Bounded(tx), ReceiverInner::Bounded(rx))
    };
    (
        DispatchSender { inner: tx },
        DispatchReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

impl DispatchSender {
    /// Enqueue a record, waiting for room if the channel is bounded and full.
    pub async fn send(&self, record: LogRecord) -> Result<(), ChannelClosed> {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.send(record).await.map_err(|e| ChannelClosed(e.0)),
            SenderInner::Unbounded(tx) => tx.send(record).map_err(|e| ChannelClosed(e.0)),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.is_closed(),
            SenderInner::Unbounded(tx) => tx.is_closed(),
        }
    }
}

impl DispatchReceiver {
    /// Next record, or `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<LogRecord> {
        let mut rx = self.inner.lock().await;
        match &mut *rx {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(n: i64) -> LogRecord {
        LogRecord::new().field("n", n)
    }

    #[tokio::test]
    async fn test_fifo_for_single_producer() {
        let (tx, rx) = dispatch_channel(0);
        for n in 0..5 {
            tx.send(record(n)).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r.get("n").and_then(|v| v.as_int()).unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_closed_after_senders_drop_and_drain() {
        let (tx, rx) = dispatch_channel(4);
        tx.send(record(1)).await.unwrap();
        let tx2 = tx.clone();
        drop(tx);
        assert!(rx.recv().await.is_some());
        drop(tx2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_fails_without_receivers() {
        let (tx, rx) = dispatch_channel(0);
        drop(rx);
        assert!(tx.is_closed());
        let err = tx.send(record(9)).await.unwrap_err();
        assert_eq!(err.0.get("n").and_then(|v| v.as_int()), Some(9));
    }

    #[tokio::test]
    async fn test_competing_receivers_each_record_once() {
        let (tx, rx) = dispatch_channel(8);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let rx = rx.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(r) = rx.recv().await {
                    got.push(r.get("n").and_then(|v| v.as_int()).unwrap());
                }
                got
            }));
        }
        drop(rx);

        for n in 0..200 {
            tx.send(record(n)).await.unwrap();
        }
        drop(tx);

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        assert_eq!(all.len(), 200);
        let unique: HashSet<_> = all.into_iter().collect();
        assert_eq!(unique.len(), 200);
    }
}
