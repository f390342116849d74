//! Session state machine.
//!
//! A [`Session`] is owned by its actor task, which serializes every engine
//! event, timer firing and connection change. Nothing here is shared.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::SessionError;
use super::lifecycle::{IdleAction, IdleLifecycle};
use super::piece_map::PieceMap;
use super::preload::PreloadPlan;
use super::snapshot::{FileEntry, SessionSnapshot, SessionState, TorrentDetails};
use super::timer::{SessionTimers, TimerKind, TimerToken};
use crate::config::SessionConfig;
use crate::engine::{ByteStream, EngineEvent, EngineFile, SwarmEngine, TorrentInfo};
use crate::streaming::ByteRange;
use crate::torrent::{InfoHash, MagnetLink};

/// What a streaming request may do with the session right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playback {
    /// Metadata has not arrived yet; retry shortly
    NotReady,
    /// Metadata never arrived
    Failed,
    /// The main file can be streamed
    Ready { main_file: EngineFile },
}

/// One torrent download and its playout state.
pub struct Session {
    id: InfoHash,
    display_name: String,
    state: SessionState,
    paused: bool,
    serving: bool,
    pieces: PieceMap,
    preload: Option<PreloadPlan>,
    info: Option<TorrentInfo>,
    main_file: Option<EngineFile>,
    lifecycle: IdleLifecycle,
    timers: SessionTimers,
    engine: Box<dyn SwarmEngine>,
    config: SessionConfig,
}

impl Session {
    /// Creates a session in the Metadata state and starts its metadata timer.
    pub fn new(magnet: &MagnetLink, engine: Box<dyn SwarmEngine>, config: SessionConfig) -> Self {
        let mut timers = SessionTimers::new();
        timers.arm(TimerKind::Metadata, Instant::now() + config.metadata_timeout);

        Self {
            id: magnet.info_hash,
            display_name: magnet.name(),
            state: SessionState::Metadata,
            paused: false,
            serving: false,
            pieces: PieceMap::default(),
            preload: None,
            info: None,
            main_file: None,
            lifecycle: IdleLifecycle::new(config.pause_delay, config.remove_delay),
            timers,
            engine,
            config,
        }
    }

    pub fn id(&self) -> InfoHash {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_serving(&self) -> bool {
        self.serving
    }

    pub fn connections(&self) -> usize {
        self.lifecycle.connections()
    }

    pub fn piece_map(&self) -> &PieceMap {
        &self.pieces
    }

    pub fn main_file(&self) -> Option<&EngineFile> {
        self.main_file.as_ref()
    }

    pub fn timers(&self) -> &SessionTimers {
        &self.timers
    }

    /// Applies one engine notification.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::MetadataReady(info) => self.on_metadata(info),
            EngineEvent::PieceVerified(index) => {
                self.pieces.mark_verified(index);
            }
            EngineEvent::Idle => self.on_idle(),
        }
    }

    fn on_metadata(&mut self, info: TorrentInfo) {
        if self.state != SessionState::Metadata {
            debug!(
                "{} [{}]: ignoring metadata in state {:?}",
                self.display_name, self.id, self.state
            );
            return;
        }
        self.timers.cancel(TimerKind::Metadata);

        let Some(main_file) = info.largest_file().cloned() else {
            warn!("{} [{}]: torrent has no files", self.display_name, self.id);
            self.state = SessionState::Failed;
            return;
        };

        self.engine.select_file(&main_file);
        let plan = PreloadPlan::new(info.piece_count, self.config.preload_ratio);
        plan.apply(self.engine.as_ref());

        self.pieces = PieceMap::new(info.piece_count);
        self.preload = Some(plan);
        self.main_file = Some(main_file);
        self.info = Some(info);
        self.state = SessionState::Downloading;

        info!("{} [{}]: METADATA RECEIVED", self.display_name, self.id);
    }

    fn on_idle(&mut self) {
        if self.state == SessionState::Downloading && !self.paused {
            self.state = SessionState::Finished;
            info!("{} [{}]: FINISHED", self.display_name, self.id);
        }
    }

    /// Earliest outstanding timer, for the actor to sleep on.
    pub fn next_timer(&self) -> Option<(TimerKind, TimerToken, Instant)> {
        self.timers.next_due()
    }

    /// Handles an elapsed timer. Stale tokens are ignored. Returns true when
    /// the session must now be destroyed.
    pub fn fire_timer(&mut self, kind: TimerKind, token: TimerToken) -> bool {
        if !self.timers.fire(kind, token) {
            return false;
        }

        match kind {
            TimerKind::Metadata => {
                if self.state == SessionState::Metadata {
                    self.state = SessionState::Failed;
                    info!("{} [{}]: METADATA FAILED", self.display_name, self.id);
                }
                false
            }
            TimerKind::Pause => {
                if let Some(IdleAction::Pause) =
                    self.lifecycle.on_pause_elapsed(&mut self.timers, Instant::now())
                {
                    self.pause();
                }
                false
            }
            TimerKind::Remove => self.lifecycle.on_remove_elapsed() == Some(IdleAction::Destroy),
        }
    }

    pub fn add_connection(&mut self) {
        if let Some(IdleAction::Resume) = self.lifecycle.add_connection(&mut self.timers, self.paused) {
            self.resume();
        }
    }

    pub fn remove_connection(&mut self) {
        self.lifecycle.remove_connection(&mut self.timers, Instant::now());
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        if let Some(file) = &self.main_file {
            self.engine.deselect_file(file);
            self.paused = true;
            info!("{} [{}]: PAUSED", self.display_name, self.id);
        }
    }

    fn resume(&mut self) {
        if let Some(file) = &self.main_file {
            self.engine.select_file(file);
        }
        self.paused = false;
        info!("{} [{}]: RESUMED", self.display_name, self.id);
    }

    pub fn mark_serving(&mut self) {
        if !self.serving {
            self.serving = true;
            info!("{} [{}]: SERVING", self.display_name, self.id);
        }
    }

    pub fn playback(&self) -> Playback {
        match (self.state, &self.main_file) {
            (SessionState::Failed, _) => Playback::Failed,
            (state, Some(main_file)) if state.is_streamable() => Playback::Ready {
                main_file: main_file.clone(),
            },
            _ => Playback::NotReady,
        }
    }

    /// Opens a read stream over the main file. The stream owns no session
    /// state and may outlive this call.
    ///
    /// # Errors
    /// - `SessionError::MainFileUnavailable` - Metadata has not been received
    pub fn open_stream(&self, range: Option<ByteRange>) -> Result<ByteStream, SessionError> {
        let main_file = self.main_file.as_ref().ok_or(SessionError::MainFileUnavailable)?;
        Ok(self.engine.read_stream(main_file, range))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let stats = self.engine.stats();
        let details = match (&self.info, &self.preload) {
            (Some(info), Some(plan)) if self.state.is_streamable() => Some(TorrentDetails {
                files: info
                    .files
                    .iter()
                    .map(|file| FileEntry {
                        path: file.path.clone(),
                        size: file.length,
                        main: self.main_file.as_ref().is_some_and(|m| m.path == file.path),
                    })
                    .collect(),
                pieces: info.piece_count,
                pieces_preload: plan.preload_count(),
                piece_length: info.piece_length,
                piece_map: self.pieces.condensed(),
                video_ready: plan.is_video_ready(&self.pieces),
            }),
            _ => None,
        };

        SessionSnapshot {
            dn: self.display_name.clone(),
            info_hash: self.id,
            state: self.state,
            paused: self.paused,
            serving: self.serving,
            connections: self.lifecycle.connections(),
            downloaded: stats.downloaded,
            uploaded: stats.uploaded,
            download_speed: stats.download_rate / 1024.0,
            upload_speed: stats.upload_rate / 1024.0,
            peers: stats.peers,
            details,
        }
    }

    /// Cancels all timers, stops the engine and, unless `keep_data`,
    /// deletes downloaded data. Engine failures are logged and do not abort
    /// the teardown.
    pub async fn teardown(&mut self, keep_data: bool) {
        self.timers.cancel_all();

        match self.engine.stop().await {
            Ok(()) => info!("{} [{}]: REMOVED", self.display_name, self.id),
            Err(e) => warn!("{} [{}]: engine stop failed: {}", self.display_name, self.id, e),
        }

        if !keep_data {
            match self.engine.delete_data().await {
                Ok(()) => info!("{} [{}]: DELETED", self.display_name, self.id),
                Err(e) => warn!("{} [{}]: data removal failed: {}", self.display_name, self.id, e),
            }
        }
    }
}
