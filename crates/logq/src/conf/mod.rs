//! Conf module — configuration model, loading, and command-line overrides.

pub mod cli;
pub mod load;
pub mod model;

pub use cli::Args;
pub use load::ConfigError;
pub use model::{ShipperConfig, SinkConfig};
