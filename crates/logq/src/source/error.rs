//! Error — failures of the syslog listener.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dispatch channel closed")]
    ChannelClosed,

    #[error("listener task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
