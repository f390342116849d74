//! In-process simulated swarm.
//!
//! Stands in for a real BitTorrent engine during development and in
//! end-to-end tests. Each swarm synthesizes a two-file torrent (a small info
//! file followed by the main video), reports metadata after a configurable
//! delay and then "downloads" one piece per `piece_interval`: urgent pieces
//! first, then every other wanted piece in index order. File content is
//! deterministic (see [`simulated_byte`]) so streamed bytes can be checked.

use std::collections::VecDeque;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{
    ByteStream, EngineError, EngineEvent, EngineEvents, EngineFile, Priority, SwarmEngine,
    SwarmEngineFactory, SwarmStats, TorrentInfo,
};
use crate::config::SimulationConfig;
use crate::streaming::ByteRange;
use crate::torrent::{InfoHash, MagnetLink};

const READ_CHUNK_SIZE: u64 = 64 * 1024;
const INFO_FILE_NAME: &str = "info.nfo";
const INFO_FILE_SIZE: u64 = 2048;

/// Content byte at `offset` within a simulated torrent.
pub fn simulated_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Opens a [`SimulatedSwarm`] per session.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwarmFactory {
    config: SimulationConfig,
}

impl SimulatedSwarmFactory {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }
}

impl SwarmEngineFactory for SimulatedSwarmFactory {
    fn open(
        &self,
        magnet: &MagnetLink,
        storage_path: &Path,
    ) -> Result<(Box<dyn SwarmEngine>, EngineEvents), EngineError> {
        let (swarm, events) = SimulatedSwarm::start(magnet, storage_path, self.config.clone())?;
        Ok((Box::new(swarm), events))
    }
}

/// Simulated swarm engine for a single torrent.
pub struct SimulatedSwarm {
    shared: Arc<SwarmShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct SwarmShared {
    name: String,
    config: SimulationConfig,
    peers: usize,
    inner: Mutex<SwarmInner>,
    /// Wakes the download task after selection changes
    wake: Notify,
    /// Bumped on every verification and on stop
    progress: watch::Sender<u64>,
}

#[derive(Default)]
struct SwarmInner {
    info: Option<TorrentInfo>,
    verified: Vec<bool>,
    wanted: Vec<bool>,
    urgent: VecDeque<u32>,
    selected_any: bool,
    active: bool,
    stopped: bool,
    downloaded: u64,
    uploaded: u64,
}

impl SimulatedSwarm {
    /// Starts the simulated download task for `magnet`.
    ///
    /// # Errors
    /// - `EngineError::Open` - Called outside a Tokio runtime
    pub fn start(
        magnet: &MagnetLink,
        storage_path: &Path,
        config: SimulationConfig,
    ) -> Result<(Self, EngineEvents), EngineError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| EngineError::Open {
                info_hash: magnet.info_hash,
                reason: e.to_string(),
            })?;

        let (progress, _) = watch::channel(0);
        let shared = Arc::new(SwarmShared {
            name: magnet.name(),
            peers: pick_peer_count(magnet.info_hash, &config),
            config,
            inner: Mutex::new(SwarmInner::default()),
            wake: Notify::new(),
            progress,
        });

        let storage: PathBuf = storage_path.join(magnet.info_hash.to_string());
        debug!(
            "Simulated swarm for {} storing under {}",
            magnet.info_hash,
            storage.display()
        );

        let (sender, events) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_swarm(shared.clone(), sender));

        Ok((
            Self {
                shared,
                task: Mutex::new(Some(task)),
            },
            events,
        ))
    }
}

impl Drop for SimulatedSwarm {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarm {
    fn select_range(&self, pieces: Range<u32>, priority: Priority) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.info.is_none() {
                return;
            }
            let pieces: Vec<u32> = pieces.filter(|&p| (p as usize) < inner.wanted.len()).collect();
            for &piece in &pieces {
                inner.wanted[piece as usize] = true;
            }
            if priority == Priority::High {
                inner.urgent.extend(pieces);
            }
            inner.selected_any = true;
        }
        self.shared.wake.notify_one();
    }

    fn select_file(&self, file: &EngineFile) {
        let span = self.shared.file_pieces(file);
        self.select_range(span, Priority::Normal);
    }

    fn deselect_file(&self, file: &EngineFile) {
        let span = self.shared.file_pieces(file);
        {
            let mut inner = self.shared.inner.lock();
            for piece in span.clone() {
                if let Some(wanted) = inner.wanted.get_mut(piece as usize) {
                    *wanted = false;
                }
            }
            inner.urgent.retain(|piece| !span.contains(piece));
        }
        self.shared.wake.notify_one();
    }

    fn read_stream(&self, file: &EngineFile, range: Option<ByteRange>) -> ByteStream {
        let (relative_start, len) = match range {
            Some(range) => {
                let end = range.end.min(file.length.saturating_sub(1));
                (range.start, (end + 1).saturating_sub(range.start))
            }
            None => (0, file.length),
        };
        let start = file.offset + relative_start;
        let end = start + len;

        stream::unfold(
            (self.shared.clone(), start, end),
            |(shared, position, end)| async move {
                if position >= end {
                    return None;
                }
                let chunk_len = READ_CHUNK_SIZE.min(end - position);
                match shared.wait_for_span(position, chunk_len).await {
                    Ok(()) => Some((
                        Ok(synthesize(position, chunk_len)),
                        (shared, position + chunk_len, end),
                    )),
                    Err(e) => Some((Err(e), (shared, end, end))),
                }
            },
        )
        .boxed()
    }

    fn stats(&self) -> SwarmStats {
        let inner = self.shared.inner.lock();
        if inner.stopped {
            return SwarmStats {
                downloaded: inner.downloaded,
                uploaded: inner.uploaded,
                ..SwarmStats::default()
            };
        }

        let interval = self.shared.config.piece_interval.as_secs_f64();
        let download_rate = if inner.active && interval > 0.0 {
            self.shared.config.piece_length as f64 / interval
        } else {
            0.0
        };

        SwarmStats {
            downloaded: inner.downloaded,
            uploaded: inner.uploaded,
            download_rate,
            upload_rate: download_rate * self.shared.config.upload_ratio,
            peers: self.shared.peers,
        }
    }

    async fn stop(&self) -> Result<(), EngineError> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.inner.lock().stopped = true;
        self.shared.progress.send_modify(|n| *n += 1);
        debug!("Simulated swarm for {} stopped", self.shared.name);
        Ok(())
    }

    async fn delete_data(&self) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock();
        inner.verified.iter_mut().for_each(|piece| *piece = false);
        debug!("Simulated swarm for {} discarded its data", self.shared.name);
        Ok(())
    }
}

impl SwarmShared {
    fn layout(&self) -> TorrentInfo {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let files = vec![
            EngineFile {
                path: format!("{stem}/{INFO_FILE_NAME}"),
                length: INFO_FILE_SIZE,
                offset: 0,
            },
            EngineFile {
                path: format!("{stem}/{stem}.mp4"),
                length: self.config.main_file_size,
                offset: INFO_FILE_SIZE,
            },
        ];
        let total = INFO_FILE_SIZE + self.config.main_file_size;
        let piece_length = self.config.piece_length.max(1);

        TorrentInfo {
            files,
            piece_count: total.div_ceil(piece_length) as u32,
            piece_length,
        }
    }

    fn file_pieces(&self, file: &EngineFile) -> Range<u32> {
        self.inner
            .lock()
            .info
            .as_ref()
            .map(|info| info.pieces_for_span(file.offset, file.length))
            .unwrap_or(0..0)
    }

    /// Waits until every piece under `[start, start + len)` is verified,
    /// moving missing pieces to the front of the queue.
    async fn wait_for_span(&self, start: u64, len: u64) -> io::Result<()> {
        let mut progress = self.progress.subscribe();
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.stopped {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "swarm stopped"));
                }
                let Some(info) = inner.info.as_ref() else {
                    return Err(io::Error::other("torrent metadata not available"));
                };
                let missing: Vec<u32> = info
                    .pieces_for_span(start, len)
                    .filter(|&piece| !inner.verified[piece as usize])
                    .collect();
                if missing.is_empty() {
                    return Ok(());
                }
                for &piece in missing.iter().rev() {
                    inner.wanted[piece as usize] = true;
                    inner.urgent.push_front(piece);
                }
                inner.selected_any = true;
            }
            self.wake.notify_one();

            if progress.changed().await.is_err() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "swarm dropped"));
            }
        }
    }
}

impl SwarmInner {
    fn next_piece(&mut self) -> Option<u32> {
        while let Some(piece) = self.urgent.pop_front() {
            if !self.verified[piece as usize] {
                return Some(piece);
            }
        }
        self.wanted
            .iter()
            .zip(&self.verified)
            .position(|(&wanted, &verified)| wanted && !verified)
            .map(|index| index as u32)
    }

    fn piece_size(&self, piece: u32) -> u64 {
        let Some(info) = self.info.as_ref() else {
            return 0;
        };
        let total: u64 = info.files.iter().map(|f| f.length).sum();
        let start = piece as u64 * info.piece_length;
        info.piece_length.min(total.saturating_sub(start))
    }

    fn verify(&mut self, piece: u32, upload_ratio: f64) -> bool {
        if self.stopped || self.verified[piece as usize] {
            return false;
        }
        let size = self.piece_size(piece);
        self.verified[piece as usize] = true;
        self.downloaded += size;
        self.uploaded += (size as f64 * upload_ratio) as u64;
        true
    }
}

async fn run_swarm(shared: Arc<SwarmShared>, events: mpsc::UnboundedSender<EngineEvent>) {
    tokio::time::sleep(shared.config.metadata_delay).await;

    let info = shared.layout();
    {
        let mut inner = shared.inner.lock();
        let piece_count = info.piece_count as usize;
        inner.verified = vec![false; piece_count];
        inner.wanted = vec![false; piece_count];
        inner.info = Some(info.clone());
    }
    if events.send(EngineEvent::MetadataReady(info)).is_err() {
        return;
    }

    let mut idle_reported = false;
    loop {
        let next = {
            let mut inner = shared.inner.lock();
            let next = inner.next_piece();
            inner.active = next.is_some();
            (next, inner.selected_any)
        };

        match next {
            (Some(piece), _) => {
                idle_reported = false;
                tokio::time::sleep(shared.config.piece_interval).await;
                let verified = shared
                    .inner
                    .lock()
                    .verify(piece, shared.config.upload_ratio);
                if verified {
                    shared.progress.send_modify(|n| *n += 1);
                    if events.send(EngineEvent::PieceVerified(piece)).is_err() {
                        return;
                    }
                }
            }
            (None, selected_any) => {
                // Nothing selected yet is not the same as having finished.
                if selected_any && !idle_reported {
                    idle_reported = true;
                    if events.send(EngineEvent::Idle).is_err() {
                        return;
                    }
                }
                shared.wake.notified().await;
            }
        }
    }
}

pub(crate) fn synthesize(offset: u64, len: u64) -> Bytes {
    (offset..offset + len).map(simulated_byte).collect::<Vec<u8>>().into()
}

fn pick_peer_count(info_hash: InfoHash, config: &SimulationConfig) -> usize {
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&info_hash.as_bytes()[..8]);
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed));
    let low = config.min_peers.min(config.max_peers);
    let high = config.min_peers.max(config.max_peers);
    rng.random_range(low..=high)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::TryStreamExt;

    use super::*;

    fn magnet() -> MagnetLink {
        "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Sintel"
            .parse()
            .unwrap()
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            main_file_size: 100_000,
            piece_length: 16 * 1024,
            ..SimulationConfig::deterministic_testing()
        }
    }

    async fn metadata(events: &mut EngineEvents) -> TorrentInfo {
        match events.recv().await {
            Some(EngineEvent::MetadataReady(info)) => info,
            other => panic!("expected metadata, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_layout() {
        let (_swarm, mut events) =
            SimulatedSwarm::start(&magnet(), Path::new("."), config()).unwrap();
        let info = metadata(&mut events).await;

        assert_eq!(info.files.len(), 2);
        let main = info.largest_file().unwrap();
        assert_eq!(main.path, "Sintel/Sintel.mp4");
        assert_eq!(main.length, 100_000);
        assert_eq!(info.piece_count, (102_048u64).div_ceil(16 * 1024) as u32);
    }

    #[tokio::test]
    async fn test_high_priority_pieces_come_first_then_idle() {
        let (swarm, mut events) =
            SimulatedSwarm::start(&magnet(), Path::new("."), config()).unwrap();
        let info = metadata(&mut events).await;
        let last = info.piece_count - 1;

        swarm.select_range(last..last + 1, Priority::High);
        swarm.select_range(0..2, Priority::Normal);

        assert_eq!(events.recv().await, Some(EngineEvent::PieceVerified(last)));
        assert_eq!(events.recv().await, Some(EngineEvent::PieceVerified(0)));
        assert_eq!(events.recv().await, Some(EngineEvent::PieceVerified(1)));
        assert_eq!(events.recv().await, Some(EngineEvent::Idle));
    }

    #[tokio::test]
    async fn test_read_stream_waits_for_pieces_and_yields_content() {
        let (swarm, mut events) =
            SimulatedSwarm::start(&magnet(), Path::new("."), config()).unwrap();
        let info = metadata(&mut events).await;
        let main = info.largest_file().unwrap().clone();

        let range = ByteRange::new(10, 109);
        let chunks: Vec<Bytes> = swarm
            .read_stream(&main, Some(range))
            .try_collect()
            .await
            .unwrap();
        let body: Vec<u8> = chunks.concat();

        assert_eq!(body.len(), 100);
        assert_eq!(body[0], simulated_byte(main.offset + 10));
        assert_eq!(body[99], simulated_byte(main.offset + 109));
    }

    #[tokio::test]
    async fn test_stop_ends_pending_reads() {
        let slow = SimulationConfig {
            piece_interval: Duration::from_secs(3600),
            ..config()
        };
        let (swarm, mut events) = SimulatedSwarm::start(&magnet(), Path::new("."), slow).unwrap();
        let info = metadata(&mut events).await;
        let main = info.largest_file().unwrap().clone();

        let mut stream = swarm.read_stream(&main, None);
        let reader = tokio::spawn(async move { stream.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        swarm.stop().await.unwrap();
        let first = reader.await.unwrap();
        assert!(matches!(first, Some(Err(_))));
        assert_eq!(swarm.stats().peers, 0);
    }

    #[test]
    fn test_peer_count_is_deterministic() {
        let config = SimulationConfig::default();
        let hash = magnet().info_hash;
        let peers = pick_peer_count(hash, &config);
        assert_eq!(peers, pick_peer_count(hash, &config));
        assert!((config.min_peers..=config.max_peers).contains(&peers));
    }
}
