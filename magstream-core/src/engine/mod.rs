//! Swarm engine abstraction
//!
//! The swarm engine owns the BitTorrent side of a session: peer discovery,
//! piece transfer and verification, and on-disk storage. Sessions drive it
//! through [`SwarmEngine`] and learn about its progress through an ordered
//! [`EngineEvent`] channel created alongside each engine.

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod simulated;

use std::ops::Range;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{EngineCall, MockSwarm, MockSwarmControl, MockSwarmFactory, mock_torrent_info};
pub use simulated::{SimulatedSwarm, SimulatedSwarmFactory};

use crate::streaming::ByteRange;
use crate::torrent::{InfoHash, MagnetLink};

/// Stream of file bytes served by an engine.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Receiving half of an engine's event channel.
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFile {
    /// Path relative to the torrent root
    pub path: String,
    /// Length in bytes
    pub length: u64,
    /// Byte offset of the file within the concatenated torrent content
    pub offset: u64,
}

impl EngineFile {
    /// Name component of the path, used for MIME detection.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Torrent layout, available once metadata has been received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    pub files: Vec<EngineFile>,
    pub piece_count: u32,
    pub piece_length: u64,
}

impl TorrentInfo {
    /// The file with the greatest length; the first one wins ties.
    pub fn largest_file(&self) -> Option<&EngineFile> {
        self.files.iter().fold(None, |best: Option<&EngineFile>, file| match best {
            Some(current) if current.length >= file.length => Some(current),
            _ => Some(file),
        })
    }

    /// Pieces overlapping the byte span `[start, start + len)` of the torrent.
    pub fn pieces_for_span(&self, start: u64, len: u64) -> Range<u32> {
        if len == 0 || self.piece_length == 0 {
            return 0..0;
        }
        let first = (start / self.piece_length) as u32;
        let last = ((start + len - 1) / self.piece_length) as u32;
        first.min(self.piece_count)..(last + 1).min(self.piece_count)
    }
}

/// Notifications delivered by an engine, in order, on its event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Torrent metadata has been received from the swarm
    MetadataReady(TorrentInfo),
    /// A piece was downloaded and passed hash verification
    PieceVerified(u32),
    /// The engine has no selected work left to fetch
    Idle,
}

/// Fetch priority for a selected piece range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    High,
}

/// Live transfer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwarmStats {
    /// Cumulative bytes downloaded
    pub downloaded: u64,
    /// Cumulative bytes uploaded
    pub uploaded: u64,
    /// Current download rate in bytes per second
    pub download_rate: f64,
    /// Current upload rate in bytes per second
    pub upload_rate: f64,
    /// Connected peers
    pub peers: usize,
}

/// Operations a session performs on its swarm engine.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Requests the pieces in `pieces` (half-open) at the given priority.
    fn select_range(&self, pieces: Range<u32>, priority: Priority);

    /// Marks every piece of `file` as wanted.
    fn select_file(&self, file: &EngineFile);

    /// Withdraws interest in `file`; the engine may go idle afterwards.
    fn deselect_file(&self, file: &EngineFile);

    /// Streams `file`, or the given range of it, as pieces become available.
    fn read_stream(&self, file: &EngineFile, range: Option<ByteRange>) -> ByteStream;

    /// Snapshot of transfer statistics.
    fn stats(&self) -> SwarmStats;

    /// Disconnects from the swarm and releases engine resources.
    ///
    /// # Errors
    /// - `EngineError::Stop` - The engine could not be shut down cleanly
    async fn stop(&self) -> Result<(), EngineError>;

    /// Removes downloaded data from storage.
    ///
    /// # Errors
    /// - `EngineError::Delete` - Stored data could not be removed
    async fn delete_data(&self) -> Result<(), EngineError>;
}

/// Creates swarm engines for new sessions.
pub trait SwarmEngineFactory: Send + Sync {
    /// Starts a swarm download for `magnet`, storing data under `storage_path`.
    ///
    /// # Errors
    /// - `EngineError::Open` - The engine could not be started
    fn open(
        &self,
        magnet: &MagnetLink,
        storage_path: &Path,
    ) -> Result<(Box<dyn SwarmEngine>, EngineEvents), EngineError>;
}

/// Errors reported by swarm engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to open swarm for {info_hash}: {reason}")]
    Open { info_hash: InfoHash, reason: String },

    #[error("Failed to stop swarm: {reason}")]
    Stop { reason: String },

    #[error("Failed to delete downloaded data: {reason}")]
    Delete { reason: String },
}
