//! Record — the ordered log record handed from the listener to the workers.

pub mod model;
mod serde_utils;

pub use model::{FieldValue, LogRecord, RecordError, RecordOrigin};
