//! Model — ShipperConfig and SinkConfig.

use serde::{Deserialize, Serialize};

/// Everything the shipper needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// Worker count; 0 derives it from the CPU count.
    pub workers: usize,
    /// Dispatch channel capacity; 0 means unbounded.
    pub channel_capacity: usize,
    pub max_connections: usize,
    /// Largest accepted syslog frame, in bytes.
    pub max_message_size: usize,
    /// Close the channel and join the pool before exiting.
    pub drain_on_exit: bool,
    pub redis: SinkConfig,
}

/// Connection settings for the Redis list sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Name of the list records are pushed onto.
    pub key: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 514,
            workers: 0,
            channel_capacity: 0,
            max_connections: 1024,
            max_message_size: 8 * 1024,
            drain_on_exit: false,
            redis: SinkConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            key: "gologq".to_string(),
        }
    }
}

impl ShipperConfig {
    /// `address:port` the listener binds to.
    pub fn listen_endpoint(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

impl SinkConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
