//! Integration tests for the session lifecycle.
//!
//! These tests drive sessions end to end through the public
//! `SessionRegistry` API against the simulated swarm, with Tokio's clock
//! paused so every delay elapses deterministically.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use magstream_core::config::MagstreamConfig;
use magstream_core::engine::SimulatedSwarmFactory;
use magstream_core::engine::simulated::simulated_byte;
use magstream_core::session::{SessionHandle, SessionSnapshot, SessionState};
use magstream_core::streaming::parse_range_header;
use magstream_core::{SessionRegistry, StreamingError};
use tokio::time::{sleep, timeout};

const SINTEL: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Sintel";
const BUNNY: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Big+Buck+Bunny";

/// Test fixture wrapping a registry backed by the simulated swarm.
struct LifecycleFixture {
    config: MagstreamConfig,
    registry: SessionRegistry,
}

impl LifecycleFixture {
    fn new() -> Self {
        Self::with_config(MagstreamConfig::for_testing())
    }

    fn with_config(config: MagstreamConfig) -> Self {
        let factory = SimulatedSwarmFactory::new(config.simulation.clone());
        let registry = SessionRegistry::new(config.clone(), Arc::new(factory));
        Self { config, registry }
    }

    /// Polls the session until `predicate` holds.
    async fn wait_for(
        &self,
        handle: &SessionHandle,
        predicate: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        timeout(Duration::from_secs(60), async {
            loop {
                let snapshot = handle.snapshot().await.unwrap();
                if predicate(&snapshot) {
                    return snapshot;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session never reached the expected state")
    }

    fn idle_timeout(&self) -> Duration {
        self.config.session.pause_delay + self.config.session.remove_delay + Duration::from_millis(50)
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_downloads_and_becomes_video_ready() {
    let fixture = LifecycleFixture::new();
    let handle = fixture.registry.get_or_create(SINTEL).unwrap();
    let _connection = handle.attach();

    let initial = handle.snapshot().await.unwrap();
    assert_eq!(initial.state, SessionState::Metadata);
    assert!(initial.details.is_none());

    let ready = fixture
        .wait_for(&handle, |s| s.details.as_ref().is_some_and(|d| d.video_ready))
        .await;
    let details = ready.details.unwrap();
    assert_eq!(details.files.iter().filter(|f| f.main).count(), 1);
    assert_eq!(details.pieces_preload, 1);
    assert_eq!(
        details.piece_map.iter().map(String::len).sum::<usize>(),
        details.pieces as usize
    );

    let finished = fixture
        .wait_for(&handle, |s| s.state == SessionState::Finished)
        .await;
    assert!(finished.details.unwrap().piece_map.iter().all(|b| !b.contains('.')));
}

#[tokio::test(start_paused = true)]
async fn test_range_stream_yields_requested_bytes() {
    let fixture = LifecycleFixture::new();
    let handle = fixture.registry.get_or_create(SINTEL).unwrap();
    let _connection = handle.attach();

    fixture
        .wait_for(&handle, |s| s.state != SessionState::Metadata)
        .await;
    let main_file = handle.playback().await.unwrap().into_main_file().unwrap();

    let range = parse_range_header("bytes=0-99", main_file.length)
        .unwrap()
        .unwrap();
    assert_eq!(range.span(main_file.length), format!("0-99/{}", main_file.length));

    let chunks: Vec<bytes::Bytes> = handle
        .open_stream(Some(range))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let body = chunks.concat();
    assert_eq!(body.len(), 100);
    assert!(
        body.iter()
            .enumerate()
            .all(|(i, &b)| b == simulated_byte(main_file.offset + i as u64))
    );

    assert!(matches!(
        parse_range_header(&format!("bytes={}-", main_file.length), main_file.length),
        Err(StreamingError::RangeUnsatisfiable { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_marks_session_failed() {
    let mut config = MagstreamConfig::for_testing();
    config.simulation.metadata_delay = config.session.metadata_timeout * 4;
    let fixture = LifecycleFixture::with_config(config);

    let handle = fixture.registry.get_or_create(SINTEL).unwrap();
    let _connection = handle.attach();

    let failed = fixture
        .wait_for(&handle, |s| s.state == SessionState::Failed)
        .await;
    assert!(failed.details.is_none());

    // Metadata arriving later must not revive the session
    sleep(fixture.config.simulation.metadata_delay).await;
    assert_eq!(handle.snapshot().await.unwrap().state, SessionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_unattended_session_pauses_then_leaves_registry() {
    let fixture = LifecycleFixture::new();
    let handle = fixture.registry.get_or_create(SINTEL).unwrap();
    let connection = handle.attach();
    fixture
        .wait_for(&handle, |s| s.state != SessionState::Metadata)
        .await;

    drop(connection);
    sleep(fixture.config.session.pause_delay + Duration::from_millis(5)).await;
    assert!(handle.snapshot().await.unwrap().paused);

    sleep(fixture.idle_timeout()).await;
    assert!(fixture.registry.is_empty());
    assert!(handle.snapshot().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_during_removal_delay_keeps_session() {
    let fixture = LifecycleFixture::new();
    let handle = fixture.registry.get_or_create(SINTEL).unwrap();
    handle.attach().release();
    fixture
        .wait_for(&handle, |s| s.state != SessionState::Metadata && s.paused)
        .await;

    let again = fixture.registry.get_or_create(SINTEL).unwrap();
    assert!(again.same_session(&handle));
    let _connection = again.attach();

    sleep(fixture.idle_timeout()).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.paused);
    assert_eq!(snapshot.connections, 1);
    assert_eq!(fixture.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_every_session() {
    let fixture = LifecycleFixture::new();
    let sintel = fixture.registry.get_or_create(SINTEL).unwrap();
    let bunny = fixture.registry.get_or_create(BUNNY).unwrap();
    let _first = sintel.attach();
    let _second = bunny.attach();

    assert_eq!(fixture.registry.list().await.len(), 2);
    assert_eq!(fixture.registry.shutdown().await, 2);

    assert!(fixture.registry.is_empty());
    assert!(sintel.is_closed());
    assert!(bunny.is_closed());
    assert!(fixture.registry.list().await.is_empty());
}
