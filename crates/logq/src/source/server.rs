//! Server — TCP syslog listener.
//!
//! Accepts connections, splits each stream into frames, parses every frame
//! into a [`LogRecord`] and sends it into the dispatch channel. Frames that
//! do not parse are forwarded raw so nothing received is silently lost.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::conf::ShipperConfig;
use crate::metrics::PipelineMetrics;
use crate::pool::DispatchSender;
use crate::record::{FieldValue, LogRecord, RecordOrigin};
use crate::report::SharedReporter;
use super::error::SourceError;
use super::framing::{Frame, FrameReader};
use super::syslog::SyslogParser;

/// Read buffer per connection.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Requests a running server to stop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Resolves once shutdown is requested. Never resolves if every handle is gone.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A bound listener running on its own task.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), SourceError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop accepting and close every open connection.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the listener to stop. Once this returns every handler has
    /// finished and the server's senders are dropped.
    pub async fn wait(self) -> Result<(), SourceError> {
        self.task.await?
    }
}

pub struct SyslogServer;

impl SyslogServer {
    /// Bind the listen address and start accepting on a background task.
    ///
    /// Binding happens before this returns, so an unusable address is
    /// reported here rather than from [`RunningServer::wait`].
    pub async fn start(
        config: &ShipperConfig,
        sender: DispatchSender,
        reporter: SharedReporter,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<RunningServer, SourceError> {
        let address = config.listen_endpoint();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| SourceError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        reporter.info(&format!(
            "Listening for syslog on {} (max {} connections, {} byte frames)",
            local_addr, config.max_connections, config.max_message_size
        ));

        let (tx, rx) = watch::channel(false);
        let acceptor = Acceptor {
            listener,
            connections: Arc::new(Semaphore::new(config.max_connections)),
            shared: Arc::new(Shared {
                sender,
                reporter,
                metrics,
                sequence: AtomicU64::new(0),
                max_message_size: config.max_message_size,
            }),
        };
        let task = tokio::spawn(acceptor.run(rx));

        Ok(RunningServer {
            local_addr,
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            task,
        })
    }
}

/// State every connection handler shares.
struct Shared {
    sender: DispatchSender,
    reporter: SharedReporter,
    metrics: Arc<PipelineMetrics>,
    sequence: AtomicU64,
    max_message_size: usize,
}

struct Acceptor {
    listener: TcpListener,
    connections: Arc<Semaphore>,
    shared: Arc<Shared>,
}

impl Acceptor {
    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        let mut handlers: JoinSet<Result<(), SourceError>> = JoinSet::new();
        let mut result = Ok(());

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined.map_err(SourceError::from).and_then(|r| r) {
                        self.shared.reporter.error(&format!("Connection handler failed: {}", e));
                        if matches!(e, SourceError::ChannelClosed) {
                            result = Err(e);
                            break;
                        }
                    }
                }

                accepted = self.accept() => {
                    match accepted {
                        Ok((stream, peer, permit)) => {
                            let handler = Connection {
                                peer,
                                shared: Arc::clone(&self.shared),
                                _permit: permit,
                            };
                            handlers.spawn(handler.run(stream, shutdown.clone()));
                        }
                        Err(e) => {
                            self.shared.reporter.warn(&format!("Syslog accept error: {}", e));
                        }
                    }
                }
            }
        }

        // Handlers watch the same shutdown signal; on a channel failure they
        // are aborted instead.
        if result.is_err() {
            handlers.abort_all();
        }
        while handlers.join_next().await.is_some() {}

        self.shared.reporter.info("Syslog listener stopped");
        result
    }

    /// Wait for a free connection slot, then for a client.
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = Arc::clone(&self.connections)
            .acquire_owned()
            .await
            .map_err(|e| io::Error::other(e.to_string()))?;
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer, permit))
    }
}

/// One client connection. Holds a connection slot until dropped.
struct Connection {
    peer: SocketAddr,
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    async fn run(self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        let shared = &self.shared;
        shared.metrics.connection_opened();
        shared.reporter.debug(&format!("Connection from {}", self.peer));

        let mut frames = FrameReader::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, stream),
            shared.max_message_size,
        );

        let result = loop {
            let frame = tokio::select! {
                _ = stopped(&mut shutdown) => break Ok(()),
                frame = frames.next_frame() => frame,
            };

            match frame {
                Ok(Frame::Message(raw)) => match self.dispatch(raw, &mut shutdown).await {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                },
                Ok(Frame::TooLong) => {
                    shared.metrics.frame_oversized();
                    shared.reporter.warn(&format!(
                        "Dropped syslog frame from {} larger than {} bytes",
                        self.peer, shared.max_message_size
                    ));
                }
                Ok(Frame::Eof) => break Ok(()),
                Err(e) => {
                    if !is_connection_reset(&e) {
                        shared.reporter.debug(&format!("Read error from {}: {}", self.peer, e));
                    }
                    break Ok(());
                }
            }
        };

        shared.metrics.connection_closed();
        shared.reporter.debug(&format!("Connection from {} closed", self.peer));
        result
    }

    /// Parse one frame and queue it. Returns false if shutdown was requested
    /// while waiting for room in the channel; that record is dropped.
    async fn dispatch(&self, raw: Bytes, shutdown: &mut watch::Receiver<bool>) -> Result<bool, SourceError> {
        let shared = &self.shared;
        let origin = RecordOrigin {
            peer: self.peer,
            sequence: shared.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut record = match SyslogParser.parse(&raw) {
            Ok(record) => record,
            Err(e) => {
                shared.metrics.frame_unparsed();
                shared
                    .reporter
                    .debug(&format!("Forwarding unparsed frame {}: {}", origin, e));
                LogRecord::with_capacity(2).field("content", FieldValue::Raw(raw))
            }
        };
        record.push("client", self.peer.to_string());

        tokio::select! {
            _ = stopped(shutdown) => return Ok(false),
            sent = shared.sender.send(record.with_origin(origin)) => {
                sent.map_err(|_| SourceError::ChannelClosed)?;
            }
        }
        shared.metrics.record_received();
        Ok(true)
    }
}

/// Check if error is a connection reset (expected when clients hang up)
fn is_connection_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use crate::pool::{dispatch_channel, DispatchReceiver};
    use crate::report::MemoryReporter;

    fn local_config() -> ShipperConfig {
        ShipperConfig {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            ..Default::default()
        }
    }

    async fn start(config: &ShipperConfig) -> (RunningServer, DispatchReceiver, Arc<PipelineMetrics>) {
        let (tx, rx) = dispatch_channel(0);
        let metrics = Arc::new(PipelineMetrics::new());
        let server = SyslogServer::start(config, tx, Arc::new(MemoryReporter::new()), metrics.clone())
            .await
            .unwrap();
        (server, rx, metrics)
    }

    async fn recv(rx: &DispatchReceiver) -> LogRecord {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a record")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_parses_and_tags_records() {
        let (server, rx, metrics) = start(&local_config()).await;
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        let client_addr = client.local_addr().unwrap().to_string();
        client
            .write_all(b"<34>Oct 11 22:14:15 mymachine su: failed\n<13>1 - host app - - - hi\n")
            .await
            .unwrap();

        let first = recv(&rx).await;
        assert_eq!(first.get("tag").and_then(FieldValue::as_str), Some("su"));
        assert_eq!(first.get("client").and_then(FieldValue::as_str), Some(client_addr.as_str()));
        assert_eq!(first.origin().map(|o| o.sequence), Some(0));

        let second = recv(&rx).await;
        assert_eq!(second.get("message").and_then(FieldValue::as_str), Some("hi"));
        assert_eq!(second.keys().last(), Some("client"));
        assert_eq!(second.origin().map(|o| o.sequence), Some(1));

        assert_eq!(metrics.snapshot().received, 2);
        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_unparsed_frame_is_forwarded_raw() {
        let (server, rx, metrics) = start(&local_config()).await;
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"plain text\n\xff\xfe\n").await.unwrap();

        let plain = recv(&rx).await;
        assert_eq!(plain.keys().collect::<Vec<_>>(), vec!["content", "client"]);
        assert_eq!(plain.get("content").and_then(FieldValue::as_str), Some("plain text"));

        let binary = recv(&rx).await;
        assert!(binary.to_json().is_err());
        assert!(binary.identity().is_some());

        assert_eq!(metrics.snapshot().unparsed, 2);
        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let (server, _rx, _metrics) = start(&local_config()).await;
        let config = ShipperConfig {
            listen_port: server.local_addr().port(),
            ..local_config()
        };
        let (tx, _rx2) = dispatch_channel(0);
        let err = SyslogServer::start(&config, tx, Arc::new(MemoryReporter::new()), Arc::new(PipelineMetrics::new()))
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, SourceError::Bind { .. }));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel_after_handlers_finish() {
        let (server, rx, _metrics) = start(&local_config()).await;
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"<13>queued\n").await.unwrap();
        recv(&rx).await;

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.wait())
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_handler_waiting_on_full_channel() {
        let (tx, rx) = dispatch_channel(1);
        let metrics = Arc::new(PipelineMetrics::new());
        let server = SyslogServer::start(&local_config(), tx, Arc::new(MemoryReporter::new()), metrics.clone())
            .await
            .unwrap();

        // Nobody reads `rx`: the first record fills the channel, the second blocks.
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"<13>one\n<13>two\n<13>three\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.snapshot().received < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.wait())
            .await
            .expect("server did not stop while a send was pending")
            .unwrap();
        assert_eq!(metrics.snapshot().received, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connection_limit_defers_extra_clients() {
        let config = ShipperConfig {
            max_connections: 1,
            ..local_config()
        };
        let (server, rx, metrics) = start(&config).await;

        let mut first = TcpStream::connect(server.local_addr()).await.unwrap();
        first.write_all(b"<13>first\n").await.unwrap();
        recv(&rx).await;

        // Completes at the TCP level but is not served until a slot frees up.
        let mut second = TcpStream::connect(server.local_addr()).await.unwrap();
        second.write_all(b"<13>second\n").await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        assert_eq!(metrics.snapshot().connections_total, 1);

        drop(first);
        let record = recv(&rx).await;
        assert_eq!(record.get("content").and_then(FieldValue::as_str), Some("second"));

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frames_are_counted() {
        let config = ShipperConfig {
            max_message_size: 16,
            ..local_config()
        };
        let (server, rx, metrics) = start(&config).await;
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"<13>this line is far too long\n<13>ok\n").await.unwrap();

        let record = recv(&rx).await;
        assert_eq!(record.get("content").and_then(FieldValue::as_str), Some("ok"));
        assert_eq!(metrics.snapshot().oversized, 1);

        server.shutdown();
        server.wait().await.unwrap();
    }
}
