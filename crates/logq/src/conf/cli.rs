//! Cli — command-line flags layered over the loaded configuration.

use clap::Parser;

use super::model::ShipperConfig;

/// Syslog to Redis log shipper.
#[derive(Parser, Debug, Default)]
#[command(about, disable_version_flag = true, rename_all = "snake_case")]
pub struct Args {
    /// Print debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print version and exit
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<String>,

    /// Address to listen on
    #[arg(long)]
    pub listen: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Redis host
    #[arg(long)]
    pub redis_host: Option<String>,

    /// Redis port
    #[arg(long)]
    pub redis_port: Option<u16>,

    /// Redis list the records are pushed onto
    #[arg(long)]
    pub redis_key: Option<String>,

    /// Redis password
    #[arg(long)]
    pub redis_password: Option<String>,

    /// Redis database
    #[arg(long)]
    pub redis_db: Option<i64>,

    /// Number of workers (0 = three per CPU)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Dispatch channel capacity (0 = unbounded)
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Maximum concurrent client connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Deliver queued records before exiting
    #[arg(long)]
    pub drain_on_exit: bool,
}

impl Args {
    /// Overwrite `config` with every flag that was given.
    pub fn apply(&self, config: &mut ShipperConfig) {
        if let Some(listen) = &self.listen {
            config.listen_address = listen.clone();
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(host) = &self.redis_host {
            config.redis.host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.redis.port = port;
        }
        if let Some(key) = &self.redis_key {
            config.redis.key = key.clone();
        }
        if let Some(password) = &self.redis_password {
            config.redis.password = Some(password.clone());
        }
        if let Some(db) = self.redis_db {
            config.redis.db = db;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.channel_capacity {
            config.channel_capacity = capacity;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if self.drain_on_exit {
            config.drain_on_exit = true;
        }
    }
}
