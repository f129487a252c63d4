//! Boot — logging init, sizing, sink connection.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::{ConfigError, ShipperConfig, SinkConfig};
use crate::pool::{available_cpus, resolve_pool_size, PoolError};
use crate::report::SharedReporter;
use crate::sink::{RedisSink, Sink, SinkError};
use crate::source::SourceError;

pub const APP_NAME: &str = "logq";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process exit status after printing the version.
pub const VERSION_EXIT_CODE: u8 = 10;

/// Fatal startup failures. Any of these ends the process with status 1.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Redis sink unavailable: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Initialise the tracing / logging subsystem. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "logq=debug" } else { "logq=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The line printed for `--version`.
pub fn version_line() -> String {
    format!("{} {} at your service.", APP_NAME, VERSION)
}

/// Everything `serve` needs, checked and connected.
pub struct Booted {
    pub config: ShipperConfig,
    pub pool_size: usize,
    pub sink: Arc<dyn Sink>,
}

/// Validate the config, size the pool and connect to Redis.
pub async fn boot(config: ShipperConfig, reporter: SharedReporter) -> Result<Booted, BootError> {
    let sink_reporter = reporter.clone();
    boot_with(config, reporter, available_cpus(), move |sink_config| async move {
        let sink = RedisSink::connect(&sink_config, sink_reporter).await?;
        Ok::<Arc<dyn Sink>, SinkError>(Arc::new(sink))
    })
    .await
}

/// [`boot`] with the CPU count and sink connector supplied by the caller.
///
/// The connector is only invoked once the configuration and pool size are
/// known to be valid.
pub async fn boot_with<F, Fut>(
    config: ShipperConfig,
    reporter: SharedReporter,
    cpus: usize,
    connect: F,
) -> Result<Booted, BootError>
where
    F: FnOnce(SinkConfig) -> Fut,
    Fut: Future<Output = Result<Arc<dyn Sink>, SinkError>>,
{
    config.validate()?;
    let pool_size = resolve_pool_size(config.workers, cpus)?;

    reporter.info(&format!(
        "Starting {} version: {} on host {}",
        APP_NAME,
        VERSION,
        hostname()
    ));
    reporter.info(&format!(
        "Workers: {} ({}), channel: {}",
        pool_size,
        if config.workers == 0 { "auto" } else { "configured" },
        match config.channel_capacity {
            0 => "unbounded".to_string(),
            n => format!("bounded to {}", n),
        }
    ));

    let sink = connect(config.redis.clone()).await?;
    let pong = sink.ping().await?;
    reporter.info(&format!("Redis at {} answered {}", config.redis.endpoint(), pong));

    Ok(Booted {
        config,
        pool_size,
        sink,
    })
}

/// Host name for the startup banner: `HOSTNAME`, then the system name.
pub fn hostname() -> String {
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    match nix::unistd::gethostname() {
        Ok(name) => match name.into_string() {
            Ok(name) if !name.is_empty() => return name,
            _ => {}
        },
        Err(e) => tracing::warn!("Failed to get system hostname: {}", e),
    }

    "unknown".to_string()
}
