//! Status snapshots reported by `/` and `/add`.

use serde::Serialize;

use crate::torrent::InfoHash;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for torrent metadata
    Metadata,
    Downloading,
    /// The swarm reported no remaining work while unpaused
    Finished,
    /// Metadata did not arrive in time; terminal
    Failed,
}

impl SessionState {
    /// True once the main file is known and can be streamed.
    pub fn is_streamable(self) -> bool {
        matches!(self, SessionState::Downloading | SessionState::Finished)
    }
}

/// Point-in-time status of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub dn: String,
    pub info_hash: InfoHash,
    pub state: SessionState,
    pub paused: bool,
    pub serving: bool,
    pub connections: usize,
    pub downloaded: u64,
    pub uploaded: u64,
    /// KB/s
    pub download_speed: f64,
    /// KB/s
    pub upload_speed: f64,
    pub peers: usize,
    /// Present once the session is Downloading or Finished
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub details: Option<TorrentDetails>,
}

/// Layout and progress of a torrent whose metadata is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentDetails {
    pub files: Vec<FileEntry>,
    pub pieces: u32,
    pub pieces_preload: u32,
    pub piece_length: u64,
    /// One string per 100 pieces, `.` Missing and `*` Verified
    pub piece_map: Vec<String>,
    pub video_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub main: bool,
}
