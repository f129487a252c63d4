// Module structure for the logq syslog shipper.

// Core pipeline
pub mod record;
pub mod pool;
pub mod sink;
pub mod source;

// Infrastructure
pub mod conf;
pub mod metrics;
pub mod report;
pub mod runtime;
