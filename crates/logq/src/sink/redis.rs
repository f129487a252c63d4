//! Redis — `Sink` backed by a Redis list (LPUSH).

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::conf::SinkConfig;
use crate::report::SharedReporter;
use super::error::SinkError;
use super::traits::{Sink, SinkFuture};

/// Shared Redis handle.
///
/// `ConnectionManager` multiplexes commands over one connection and
/// reconnects on failure; cloning it is cheap, so each `append` works on
/// its own clone and callers never contend on a lock.
#[derive(Clone)]
pub struct RedisSink {
    conn: ConnectionManager,
    endpoint: String,
    reporter: SharedReporter,
}

impl RedisSink {
    /// Open a connection to the configured Redis server (AUTH and SELECT
    /// happen as part of the handshake).
    pub async fn connect(config: &SinkConfig, reporter: SharedReporter) -> Result<Self, SinkError> {
        let endpoint = config.endpoint();
        reporter.info(&format!("Connecting to Redis at {} (db {})", endpoint, config.db));

        let client = ::redis::Client::open(connection_info(config))
            .map_err(|e| SinkError::ConnectionFailed(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", endpoint, e)))?;

        Ok(Self { conn, endpoint, reporter })
    }
}

fn connection_info(config: &SinkConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone().filter(|p| !p.is_empty()),
            ..Default::default()
        },
    }
}

impl Sink for RedisSink {
    fn ping(&self) -> SinkFuture<'_, String> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let reply: String = ::redis::cmd("PING").query_async(&mut conn).await?;
            if reply != "PONG" {
                return Err(SinkError::UnexpectedPing(reply));
            }
            self.reporter.debug(&format!("Ping response from redis server {}: {}", self.endpoint, reply));
            Ok(reply)
        })
    }

    fn append<'a>(&'a self, key: &'a str, payload: String) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: () = conn.lpush(key, payload).await?;
            Ok(())
        })
    }
}
