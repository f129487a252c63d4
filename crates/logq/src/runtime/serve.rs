//! Serve — wire channel, listener and workers together and run until the
//! listener stops.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::conf::ShipperConfig;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pool::{dispatch_channel, WorkerContext, WorkerPool};
use crate::report::SharedReporter;
use crate::runtime::boot::{BootError, Booted};
use crate::runtime::stop::shutdown_signal;
use crate::sink::Sink;
use crate::source::{RunningServer, ShutdownHandle, SourceError, SyslogServer};

/// A running listener and its worker pool.
pub struct Pipeline {
    server: RunningServer,
    pool: WorkerPool,
    metrics: Arc<PipelineMetrics>,
    reporter: SharedReporter,
}

impl Pipeline {
    /// Open the channel, bind the listener, then spawn `pool_size` workers.
    pub async fn start(
        config: &ShipperConfig,
        pool_size: usize,
        sink: Arc<dyn Sink>,
        reporter: SharedReporter,
    ) -> Result<Self, SourceError> {
        let metrics = Arc::new(PipelineMetrics::new());
        let (sender, receiver) = dispatch_channel(config.channel_capacity);

        let server = SyslogServer::start(config, sender, reporter.clone(), Arc::clone(&metrics)).await?;

        let ctx = WorkerContext {
            sink,
            queue_key: Arc::from(config.redis.key.as_str()),
            reporter: reporter.clone(),
            metrics: Arc::clone(&metrics),
        };
        let pool = WorkerPool::spawn(pool_size, receiver, ctx);

        Ok(Self {
            server,
            pool,
            metrics,
            reporter,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.server.shutdown_handle()
    }

    /// Block until the listener stops.
    ///
    /// With `drain` the pool is joined first, so every record already in the
    /// channel reaches the sink. Without it the workers are left running and
    /// end with the process.
    pub async fn wait(self, drain: bool) -> Result<MetricsSnapshot, SourceError> {
        let result = self.server.wait().await;

        if drain {
            self.reporter.info("Listener stopped, draining queued records...");
            let handled = self.pool.join().await;
            self.reporter.info(&format!("Workers finished after {} records", handled));
        }

        let snapshot = self.metrics.snapshot();
        self.reporter.info(&format!(
            "Received {} records: {} appended, {} encode failures, {} append failures, {} pending",
            snapshot.received,
            snapshot.appended,
            snapshot.encode_failures,
            snapshot.append_failures,
            snapshot.pending()
        ));

        result.map(|_| snapshot)
    }
}

/// Run the pipeline until the listener stops or a shutdown signal arrives.
pub async fn serve(booted: Booted, reporter: SharedReporter) -> Result<MetricsSnapshot, BootError> {
    let Booted {
        config,
        pool_size,
        sink,
    } = booted;

    let pipeline = Pipeline::start(&config, pool_size, sink, reporter).await?;

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    Ok(pipeline.wait(config.drain_on_exit).await?)
}
