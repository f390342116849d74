//! Torrent sessions.
//!
//! One session per torrent: a state machine over engine events, the piece
//! map and preload plan, and the idle lifecycle that pauses and eventually
//! destroys unattended sessions. Each session runs as an actor; callers
//! talk to it through a [`SessionHandle`].

pub mod actor;
pub mod commands;
pub mod handle;
pub mod lifecycle;
pub mod piece_map;
pub mod preload;
pub mod snapshot;
pub mod state;
pub mod timer;

pub use actor::{DestroyCallback, spawn_session};
pub use commands::LifecycleStats;
pub use handle::{ConnectionGuard, SessionHandle};
pub use lifecycle::{IdleAction, IdleLifecycle};
pub use piece_map::{PIECE_MAP_BUCKET, PieceMap, PieceStatus};
pub use preload::PreloadPlan;
pub use snapshot::{FileEntry, SessionSnapshot, SessionState, TorrentDetails};
pub use state::{Playback, Session};
pub use timer::{SessionTimers, TimerKind, TimerToken};

use crate::engine::EngineFile;

/// Errors raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session has been destroyed")]
    Destroyed,

    #[error("Torrent metadata did not arrive in time")]
    MetadataTimeout,

    #[error("Torrent metadata has not been received yet")]
    NotYetReady,

    #[error("Main file is not available")]
    MainFileUnavailable,
}

impl Playback {
    /// The main file, or the reason it cannot be streamed yet.
    ///
    /// # Errors
    /// - `SessionError::MetadataTimeout` - Session failed
    /// - `SessionError::NotYetReady` - Metadata still pending
    pub fn into_main_file(self) -> Result<EngineFile, SessionError> {
        match self {
            Playback::Ready { main_file } => Ok(main_file),
            Playback::Failed => Err(SessionError::MetadataTimeout),
            Playback::NotReady => Err(SessionError::NotYetReady),
        }
    }
}
