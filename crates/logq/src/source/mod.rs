//! Source module — TCP syslog listener feeding the dispatch channel.

pub mod error;
pub mod framing;
pub mod server;
pub mod syslog;

pub use error::SourceError;
pub use framing::{Frame, FrameReader};
pub use server::{RunningServer, ShutdownHandle, SyslogServer};
pub use syslog::{ParseError, SyslogParser};
