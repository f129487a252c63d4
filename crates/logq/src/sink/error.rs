use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Unexpected PING reply: {0}")]
    UnexpectedPing(String),
    #[error("Append to {key} rejected: {reason}")]
    Rejected { key: String, reason: String },
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}
