//! Pool module — the fixed-size set of workers draining the dispatch channel.

pub mod channel;
pub mod sizing;
pub mod worker;

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::metrics::PipelineMetrics;
use crate::report::SharedReporter;
use crate::sink::Sink;

pub use channel::{dispatch_channel, ChannelClosed, DispatchReceiver, DispatchSender};
pub use sizing::{available_cpus, resolve_pool_size, PoolError, MAX_WORKERS, WORKERS_PER_CPU};
pub use worker::{Outcome, Worker};

/// What every worker shares.
#[derive(Clone)]
pub struct WorkerContext {
    pub sink: Arc<dyn Sink>,
    pub queue_key: Arc<str>,
    pub reporter: SharedReporter,
    pub metrics: Arc<PipelineMetrics>,
}

/// Handle to a running pool.
///
/// Dropping the handle leaves the workers running; they stop on their own
/// once the channel is closed and drained.
pub struct WorkerPool {
    size: usize,
    workers: JoinSet<u64>,
    reporter: SharedReporter,
}

impl WorkerPool {
    /// Start exactly `size` workers on the current runtime, numbered `1..=size`.
    pub fn spawn(size: usize, rx: DispatchReceiver, ctx: WorkerContext) -> Self {
        let mut workers = JoinSet::new();
        for id in 1..=size {
            let worker = Worker::new(id, ctx.clone());
            workers.spawn(worker.run(rx.clone()));
        }
        ctx.reporter.info(&format!("Started {} workers", size));
        Self {
            size,
            workers,
            reporter: ctx.reporter,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for every worker to finish. Only returns once all senders are
    /// dropped and the channel is drained.
    ///
    /// Returns the total number of records taken off the channel.
    pub async fn join(mut self) -> u64 {
        let mut handled = 0;
        while let Some(result) = self.workers.join_next().await {
            match result {
                Ok(n) => handled += n,
                Err(e) => self.reporter.error(&format!("Worker task failed: {}", e)),
            }
        }
        handled
    }
}
