//! Streaming primitives for serving a session's main file over HTTP.
//!
//! Range parsing, byte metering for the serving indicator, and a body
//! stream that keeps its session connection attached until it is dropped.

pub mod meter;
pub mod range;

pub use meter::{AttachedStream, ByteMeter, ServingMonitor, meter_stream};
pub use range::{ByteRange, parse_range_header};

use crate::session::SessionError;

/// Errors that can occur while answering a streaming request.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// Requested range lies outside the file.
    #[error("Requested range not satisfiable for {length} byte resource")]
    RangeUnsatisfiable { length: u64 },

    /// Metadata is still pending; the client should retry.
    #[error("Torrent metadata not yet available")]
    NotYetReady,

    /// The session failed to obtain metadata.
    #[error("Torrent could not be loaded")]
    NotFound,

    #[error(transparent)]
    Session(SessionError),
}

impl From<SessionError> for StreamingError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::MetadataTimeout => StreamingError::NotFound,
            SessionError::NotYetReady => StreamingError::NotYetReady,
            other => StreamingError::Session(other),
        }
    }
}

pub type StreamingResult<T> = Result<T, StreamingError>;
