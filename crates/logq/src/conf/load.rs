//! Load — config loading from file and environment variables.

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use super::model::ShipperConfig;

pub const CONFIG_FILE_ENV: &str = "LOGQ_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/logq/logq.toml";

/// Connection slots are semaphore permits; tokio caps how many one can hold.
pub const MAX_CONNECTIONS_LIMIT: usize = tokio::sync::Semaphore::MAX_PERMITS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ShipperConfig {
    /// Load configuration from file or environment variables.
    /// Priority: Environment Variables > Config File > Defaults
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_string(), true),
            None => (
                std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string()),
                false,
            ),
        };

        let mut config = if explicit || Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Self::default()
        };

        // Environment variables override file config
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Override fields from `LOGQ_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOGQ_LISTEN_ADDRESS") {
            self.listen_address = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_LISTEN_PORT")? {
            self.listen_port = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_CHANNEL_CAPACITY")? {
            self.channel_capacity = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_MAX_CONNECTIONS")? {
            self.max_connections = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_MAX_MESSAGE_SIZE")? {
            self.max_message_size = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_DRAIN_ON_EXIT")? {
            self.drain_on_exit = v;
        }
        if let Some(v) = lookup("LOGQ_REDIS_HOST") {
            self.redis.host = v;
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_REDIS_PORT")? {
            self.redis.port = v;
        }
        if let Some(v) = lookup("LOGQ_REDIS_PASSWORD") {
            self.redis.password = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "LOGQ_REDIS_DB")? {
            self.redis.db = v;
        }
        if let Some(v) = lookup("LOGQ_REDIS_KEY") {
            self.redis.key = v;
        }
        Ok(())
    }

    /// Check that configuration values are sane. Worker count limits are
    /// enforced by the pool sizing policy, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.is_empty() {
            return Err(ConfigError::Invalid("listen_address must not be empty".to_string()));
        }
        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("listen_port must be > 0".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be > 0".to_string()));
        }
        if self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_connections must be <= {}",
                MAX_CONNECTIONS_LIMIT
            )));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be > 0".to_string()));
        }
        if self.redis.host.is_empty() {
            return Err(ConfigError::Invalid("redis.host must not be empty".to_string()));
        }
        if self.redis.port == 0 {
            return Err(ConfigError::Invalid("redis.port must be > 0".to_string()));
        }
        if self.redis.key.is_empty() {
            return Err(ConfigError::Invalid("redis.key must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_apply_env_overrides_fields() {
        let mut cfg = ShipperConfig::default();
        cfg.apply_env(env(&[
            ("LOGQ_LISTEN_ADDRESS", "127.0.0.1"),
            ("LOGQ_LISTEN_PORT", "1514"),
            ("LOGQ_WORKERS", "16"),
            ("LOGQ_DRAIN_ON_EXIT", "true"),
            ("LOGQ_REDIS_HOST", "cache"),
            ("LOGQ_REDIS_DB", "3"),
            ("LOGQ_REDIS_KEY", "syslog"),
        ]))
        .unwrap();

        assert_eq!(cfg.listen_endpoint(), "127.0.0.1:1514");
        assert_eq!(cfg.workers, 16);
        assert!(cfg.drain_on_exit);
        assert_eq!(cfg.redis.endpoint(), "cache:6379");
        assert_eq!(cfg.redis.db, 3);
        assert_eq!(cfg.redis.key, "syslog");
    }

    #[test]
    fn test_apply_env_without_variables_keeps_values() {
        let mut cfg = ShipperConfig::default();
        cfg.apply_env(env(&[])).unwrap();
        assert_eq!(cfg, ShipperConfig::default());
    }

    #[test]
    fn test_apply_env_rejects_malformed_number() {
        let mut cfg = ShipperConfig::default();
        let err = cfg.apply_env(env(&[("LOGQ_WORKERS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "LOGQ_WORKERS"));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let path = std::env::temp_dir().join(format!("logq-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "workers = 12\n[redis]\nport = 6380").unwrap();
        drop(file);

        let cfg = ShipperConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.workers, 12);
        assert_eq!(cfg.redis.port, 6380);
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = ShipperConfig::from_file("/nonexistent/logq.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let err = ShipperConfig::from_toml("listen_port = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_default_passes() {
        assert!(ShipperConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let mut cfg = ShipperConfig::default();
        cfg.redis.key.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("redis.key"), "got: {}", err);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let cfg = ShipperConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ShipperConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_connection_limit_above_semaphore_capacity() {
        let cfg = ShipperConfig {
            max_connections: usize::MAX,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_connections"), "got: {}", err);

        let cfg = ShipperConfig {
            max_connections: MAX_CONNECTIONS_LIMIT,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_apply_env_huge_connection_limit_fails_validation() {
        let mut cfg = ShipperConfig::default();
        cfg.apply_env(env(&[("LOGQ_MAX_CONNECTIONS", "18446744073709551615")]))
            .unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_ignores_worker_count() {
        let cfg = ShipperConfig {
            workers: 5000,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
