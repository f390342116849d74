//! Magstream Core - torrent session lifecycle and streaming playout
//!
//! This crate tracks every active torrent download as a session, decides
//! which pieces to fetch first so playback can begin early, reclaims
//! unattended sessions, and provides the primitives for serving byte ranges
//! of a partially downloaded file.

pub mod config;
pub mod engine;
pub mod registry;
pub mod session;
pub mod streaming;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::MagstreamConfig;
pub use engine::{EngineError, SimulatedSwarmFactory, SwarmEngine, SwarmEngineFactory};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{SessionError, SessionHandle, SessionSnapshot, SessionState};
pub use streaming::StreamingError;
pub use torrent::{InfoHash, MagnetLink, TorrentError};

/// Core errors that can bubble up from any Magstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MagstreamError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for MagstreamError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Torrent(e) => MagstreamError::Torrent(e),
            RegistryError::Engine(e) => MagstreamError::Engine(e),
            RegistryError::ShuttingDown => MagstreamError::ShuttingDown,
        }
    }
}

impl MagstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            MagstreamError::Torrent(e) => match e {
                TorrentError::InvalidMagnetLink { reason } => {
                    format!("Invalid magnet link: {reason}")
                }
                TorrentError::InvalidInfoHash { reason } => format!("Invalid info hash: {reason}"),
            },
            MagstreamError::Engine(_) => "Could not start the download".to_string(),
            MagstreamError::Session(SessionError::Destroyed) => {
                "The download was stopped".to_string()
            }
            MagstreamError::Session(_) => "Download error occurred".to_string(),
            MagstreamError::Streaming(e) => match e {
                StreamingError::RangeUnsatisfiable { length } => {
                    format!("Requested range is outside the {length} byte file")
                }
                StreamingError::NotYetReady => "Video is not ready yet, retry shortly".to_string(),
                StreamingError::NotFound => "Torrent metadata could not be found".to_string(),
                StreamingError::Session(_) => "The download was stopped".to_string(),
            },
            MagstreamError::ShuttingDown => "Server is shutting down".to_string(),
            MagstreamError::Configuration { .. } => "Configuration error occurred".to_string(),
            MagstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MagstreamError::Configuration { .. }
                | MagstreamError::Torrent(_)
                | MagstreamError::Streaming(StreamingError::RangeUnsatisfiable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, MagstreamError>;
