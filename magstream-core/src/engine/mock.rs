//! Mock swarm engine for testing sessions and the HTTP layer.
//!
//! Each engine opened by a [`MockSwarmFactory`] is paired with a
//! [`MockSwarmControl`] that lets a test inject engine events and inspect
//! the calls a session made.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::simulated::synthesize;
use super::{
    ByteStream, EngineError, EngineEvent, EngineEvents, EngineFile, Priority, SwarmEngine,
    SwarmEngineFactory, SwarmStats, TorrentInfo,
};
use crate::streaming::ByteRange;
use crate::torrent::{InfoHash, MagnetLink};

const MOCK_CHUNK_SIZE: u64 = 16 * 1024;

/// A call recorded by a [`MockSwarm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    SelectRange { pieces: Range<u32>, priority: Priority },
    SelectFile(String),
    DeselectFile(String),
    ReadStream { path: String, range: Option<ByteRange> },
    Stop,
    DeleteData,
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<EngineCall>>,
    stats: Mutex<SwarmStats>,
    fail_stop: AtomicBool,
}

/// Engine handed to sessions by [`MockSwarmFactory`].
pub struct MockSwarm {
    state: Arc<MockState>,
}

/// Test-side handle to a [`MockSwarm`].
#[derive(Clone)]
pub struct MockSwarmControl {
    pub info_hash: InfoHash,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: Arc<MockState>,
}

impl MockSwarmControl {
    /// Delivers an event to the owning session. Returns false once the
    /// session has gone away.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.calls.lock().clone()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.state.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn set_stats(&self, stats: SwarmStats) {
        *self.state.stats.lock() = stats;
    }

    /// Makes subsequent `stop` calls fail.
    pub fn fail_stop(&self) {
        self.state.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.count(&EngineCall::Stop) > 0
    }

    pub fn deleted(&self) -> bool {
        self.count(&EngineCall::DeleteData) > 0
    }
}

/// Factory producing [`MockSwarm`] engines.
#[derive(Clone, Default)]
pub struct MockSwarmFactory {
    opened: Arc<Mutex<Vec<MockSwarmControl>>>,
    fail_open: Arc<AtomicBool>,
}

impl MockSwarmFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory whose `open` always fails.
    pub fn failing() -> Self {
        let factory = Self::default();
        factory.fail_open.store(true, Ordering::SeqCst);
        factory
    }

    /// Controls for every engine opened so far, oldest first.
    pub fn opened(&self) -> Vec<MockSwarmControl> {
        self.opened.lock().clone()
    }

    /// Control for the most recently opened engine.
    pub fn last(&self) -> Option<MockSwarmControl> {
        self.opened.lock().last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

impl SwarmEngineFactory for MockSwarmFactory {
    fn open(
        &self,
        magnet: &MagnetLink,
        _storage_path: &Path,
    ) -> Result<(Box<dyn SwarmEngine>, EngineEvents), EngineError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::Open {
                info_hash: magnet.info_hash,
                reason: "mock engine refused to open".to_string(),
            });
        }

        let (sender, events) = mpsc::unbounded_channel();
        let state = Arc::new(MockState::default());
        self.opened.lock().push(MockSwarmControl {
            info_hash: magnet.info_hash,
            events: sender,
            state: state.clone(),
        });

        Ok((Box::new(MockSwarm { state }), events))
    }
}

impl MockSwarm {
    fn record(&self, call: EngineCall) {
        self.state.calls.lock().push(call);
    }
}

#[async_trait]
impl SwarmEngine for MockSwarm {
    fn select_range(&self, pieces: Range<u32>, priority: Priority) {
        self.record(EngineCall::SelectRange { pieces, priority });
    }

    fn select_file(&self, file: &EngineFile) {
        self.record(EngineCall::SelectFile(file.path.clone()));
    }

    fn deselect_file(&self, file: &EngineFile) {
        self.record(EngineCall::DeselectFile(file.path.clone()));
    }

    fn read_stream(&self, file: &EngineFile, range: Option<ByteRange>) -> ByteStream {
        self.record(EngineCall::ReadStream {
            path: file.path.clone(),
            range,
        });

        let (start, end) = match range {
            Some(range) => (range.start, range.end.min(file.length.saturating_sub(1)) + 1),
            None => (0, file.length),
        };
        let offset = file.offset;
        let chunks: Vec<_> = (start..end)
            .step_by(MOCK_CHUNK_SIZE as usize)
            .map(move |position| {
                let len = MOCK_CHUNK_SIZE.min(end - position);
                Ok(synthesize(offset + position, len))
            })
            .collect();
        stream::iter(chunks).boxed()
    }

    fn stats(&self) -> SwarmStats {
        *self.state.stats.lock()
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Stop);
        if self.state.fail_stop.load(Ordering::SeqCst) {
            return Err(EngineError::Stop {
                reason: "mock engine refused to stop".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_data(&self) -> Result<(), EngineError> {
        self.record(EngineCall::DeleteData);
        Ok(())
    }
}

/// Layout used by mock-driven tests: a 1000-byte info file followed by the
/// main video of `main_length` bytes.
pub fn mock_torrent_info(main_length: u64, piece_length: u64) -> TorrentInfo {
    let files = vec![
        EngineFile {
            path: "Sample/sample.nfo".to_string(),
            length: 1000,
            offset: 0,
        },
        EngineFile {
            path: "Sample/movie.mp4".to_string(),
            length: main_length,
            offset: 1000,
        },
    ];
    TorrentInfo {
        files,
        piece_count: (1000 + main_length).div_ceil(piece_length) as u32,
        piece_length,
    }
}
