//! Session registry.
//!
//! Process-wide mapping from info hash to live session. Requests naming the
//! same torrent share one session; a session leaves the registry only when
//! it is destroyed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::MagstreamConfig;
use crate::engine::{EngineError, SwarmEngineFactory};
use crate::session::{Session, SessionHandle, SessionSnapshot, spawn_session};
use crate::torrent::{InfoHash, MagnetLink, TorrentError};

/// Errors raised while resolving a session.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Torrent(#[from] TorrentError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Registry is shutting down")]
    ShuttingDown,
}

/// Owns every live session. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<InfoHash, SessionHandle>>,
    factory: Arc<dyn SwarmEngineFactory>,
    config: MagstreamConfig,
    next_instance: AtomicU64,
    shutting_down: AtomicBool,
}

impl SessionRegistry {
    pub fn new(config: MagstreamConfig, factory: Arc<dyn SwarmEngineFactory>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                factory,
                config,
                next_instance: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MagstreamConfig {
        &self.inner.config
    }

    /// Returns the live session for `magnet_link`, creating it if needed.
    ///
    /// A session that has started tearing down is not reused; a fresh one
    /// replaces it.
    ///
    /// # Errors
    /// - `RegistryError::Torrent` - Magnet link could not be decoded
    /// - `RegistryError::Engine` - Swarm engine failed to start
    /// - `RegistryError::ShuttingDown` - Shutdown is in progress
    pub fn get_or_create(&self, magnet_link: &str) -> Result<SessionHandle, RegistryError> {
        let magnet: MagnetLink = magnet_link.parse()?;

        // Checked under the lock so shutdown cannot miss a new session
        let mut sessions = self.inner.sessions.lock();
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        if let Some(existing) = sessions.get(&magnet.info_hash) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }

        let handle = self.spawn(&magnet)?;
        sessions.insert(magnet.info_hash, handle.clone());
        info!("{} [{}]: ADDED", handle.display_name(), handle.id());
        Ok(handle)
    }

    fn spawn(&self, magnet: &MagnetLink) -> Result<SessionHandle, RegistryError> {
        let config = &self.inner.config;
        let (engine, events) = self
            .inner
            .factory
            .open(magnet, &config.storage.download_dir)?;

        let instance = self.inner.next_instance.fetch_add(1, Ordering::SeqCst);
        let registry = Arc::downgrade(&self.inner);
        let id = magnet.info_hash;
        let on_destroyed = Box::new(move || unregister(&registry, id, instance));

        Ok(spawn_session(
            Session::new(magnet, engine, config.session.clone()),
            events,
            config.session.keep_data_on_destroy,
            instance,
            on_destroyed,
        ))
    }

    /// Live session for `id`, if any.
    pub fn get(&self, id: &InfoHash) -> Option<SessionHandle> {
        self.inner
            .sessions
            .lock()
            .get(id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status snapshots of every live session.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.inner.sessions.lock().values().cloned().collect();
        join_all(handles.iter().map(SessionHandle::snapshot))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Unregisters `id`. No-op when absent.
    pub fn remove(&self, id: &InfoHash) {
        if self.inner.sessions.lock().remove(id).is_some() {
            debug!("Session {} unregistered", id);
        }
    }

    /// Destroys every session and waits for all teardowns to complete.
    /// Returns the number of sessions destroyed by this call.
    pub async fn shutdown(&self) -> usize {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let handles: Vec<SessionHandle> = self.inner.sessions.lock().values().cloned().collect();

        let destroyed = join_all(handles.iter().map(SessionHandle::destroy))
            .await
            .into_iter()
            .filter(|destroyed| *destroyed)
            .count();

        info!("Shutdown complete, {} sessions destroyed", destroyed);
        destroyed
    }
}

/// Removes the entry for `id` if it still belongs to `instance`.
fn unregister(registry: &Weak<RegistryInner>, id: InfoHash, instance: u64) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let mut sessions = inner.sessions.lock();
    if sessions.get(&id).is_some_and(|handle| handle.instance() == instance) {
        sessions.remove(&id);
        debug!("Session {} unregistered", id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::MockSwarmFactory;

    const SINTEL: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Sintel";

    fn registry() -> (SessionRegistry, MockSwarmFactory) {
        let factory = MockSwarmFactory::new();
        let registry = SessionRegistry::new(MagstreamConfig::default(), Arc::new(factory.clone()));
        (registry, factory)
    }

    #[tokio::test]
    async fn test_same_info_hash_shares_one_session() {
        let (registry, factory) = registry();

        let first = registry.get_or_create(SINTEL).unwrap();
        let base32 = "magnet:?xt=urn:btih:3WBFL3G4PSSV7MF37AJSHWDQMLNR63I4&dn=Other+Name";
        let second = registry.get_or_create(base32).unwrap();

        assert!(first.same_session(&second));
        assert_eq!(registry.len(), 1);
        assert_eq!(factory.open_count(), 1);
        assert_eq!(second.display_name(), "Sintel");
    }

    #[tokio::test]
    async fn test_invalid_magnet_creates_nothing() {
        let (registry, factory) = registry();

        let result = registry.get_or_create("not a magnet");
        assert!(matches!(
            result,
            Err(RegistryError::Torrent(TorrentError::InvalidMagnetLink { .. }))
        ));
        assert!(registry.is_empty());
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test]
    async fn test_engine_open_failure_is_reported() {
        let registry = SessionRegistry::new(
            MagstreamConfig::default(),
            Arc::new(MockSwarmFactory::failing()),
        );
        assert!(matches!(
            registry.get_or_create(SINTEL),
            Err(RegistryError::Engine(EngineError::Open { .. }))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_unregisters_and_next_request_starts_fresh() {
        let (registry, factory) = registry();
        let first = registry.get_or_create(SINTEL).unwrap();

        assert!(first.destroy().await);
        assert!(registry.is_empty());
        assert!(registry.get(&first.id()).is_none());

        let second = registry.get_or_create(SINTEL).unwrap();
        assert!(!first.same_session(&second));
        assert_eq!(factory.open_count(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_teardown_does_not_unregister_replacement() {
        let (registry, _factory) = registry();
        let first = registry.get_or_create(SINTEL).unwrap();
        let second_instance = first.instance() + 1;

        registry.inner.sessions.lock().insert(
            first.id(),
            registry.spawn(&SINTEL.parse().unwrap()).unwrap(),
        );
        assert!(first.destroy().await);

        let current = registry.get(&first.id()).unwrap();
        assert_eq!(current.instance(), second_instance);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (registry, _factory) = registry();
        let handle = registry.get_or_create(SINTEL).unwrap();

        registry.remove(&handle.id());
        registry.remove(&handle.id());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_live_sessions() {
        let (registry, _factory) = registry();
        registry.get_or_create(SINTEL).unwrap();
        registry
            .get_or_create("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
            .unwrap();

        let mut names: Vec<String> = registry.list().await.into_iter().map(|s| s.dn).collect();
        names.sort();
        assert_eq!(names, vec!["0123456789abcdef0123456789abcdef01234567", "Sintel"]);
    }

    #[tokio::test]
    async fn test_shutdown_destroys_everything() {
        let (registry, factory) = registry();
        registry.get_or_create(SINTEL).unwrap();
        registry
            .get_or_create("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
            .unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert!(registry.is_empty());
        assert!(factory.opened().iter().all(|control| control.stopped()));
        assert!(matches!(
            registry.get_or_create(SINTEL),
            Err(RegistryError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flag_is_read_under_session_lock() {
        let (registry, factory) = registry();
        let sessions = registry.inner.sessions.lock();

        let racing = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.get_or_create(SINTEL))
        };
        registry.inner.shutting_down.store(true, Ordering::SeqCst);
        drop(sessions);

        assert!(matches!(
            racing.join().unwrap(),
            Err(RegistryError::ShuttingDown)
        ));
        assert!(registry.is_empty());
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_leaves_registry() {
        let (registry, _factory) = registry();
        let config = registry.config().session.clone();
        registry.get_or_create(SINTEL).unwrap().attach().release();

        tokio::time::sleep(config.pause_delay + config.remove_delay + Duration::from_millis(10)).await;
        assert!(registry.is_empty());
    }
}
