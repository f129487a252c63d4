//! Worker — one consumer of the dispatch channel.

use crate::record::LogRecord;
use super::channel::DispatchReceiver;
use super::WorkerContext;

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Appended,
    EncodeFailed,
    AppendFailed,
}

/// A long-lived consumer identified by its ordinal in `1..=N`.
pub struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    /// Process records until the channel is closed and drained.
    ///
    /// Returns the number of records this worker took off the channel.
    pub async fn run(self, rx: DispatchReceiver) -> u64 {
        self.ctx.reporter.debug(&format!("Worker #{} started", self.id));
        let mut handled = 0u64;
        while let Some(record) = rx.recv().await {
            self.process(record).await;
            handled += 1;
        }
        self.ctx
            .reporter
            .debug(&format!("Worker #{} stopped after {} records", self.id, handled));
        handled
    }

    /// Encode one record and append it to the sink. Failures are reported
    /// and the record is dropped.
    pub async fn process(&self, record: LogRecord) -> Outcome {
        let reporter = &self.ctx.reporter;

        let payload = match record.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                self.ctx.metrics.encode_failed();
                let identity = record.identity().unwrap_or_else(|| "<unknown>".to_string());
                reporter.error(&format!(
                    "Worker #{} JSON encode error for record {}: {}",
                    self.id, identity, e
                ));
                return Outcome::EncodeFailed;
            }
        };

        if reporter.enabled(crate::report::Severity::Debug) {
            reporter.debug(&format!("Worker #{} RECV: {}", self.id, payload));
        }

        match self.ctx.sink.append(&self.ctx.queue_key, payload).await {
            Ok(()) => {
                self.ctx.metrics.record_appended();
                reporter.debug(&format!("Worker #{} appended to {}", self.id, self.ctx.queue_key));
                Outcome::Appended
            }
            Err(e) => {
                self.ctx.metrics.append_failed();
                reporter.error(&format!("Worker #{} Redis error: {}", self.id, e));
                Outcome::AppendFailed
            }
        }
    }
}
