//! Handle for communicating with a session actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::SessionError;
use super::commands::{LifecycleStats, SessionCommand};
use super::snapshot::SessionSnapshot;
use super::state::Playback;
use crate::engine::ByteStream;
use crate::streaming::ByteRange;
use crate::torrent::InfoHash;

/// Handle for communicating with a session actor.
///
/// Cheap to clone. Every operation fails with `SessionError::Destroyed`
/// once the session has been torn down.
#[derive(Clone)]
pub struct SessionHandle {
    id: InfoHash,
    display_name: Arc<str>,
    instance: u64,
    sender: mpsc::UnboundedSender<SessionCommand>,
    closing: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: InfoHash,
        display_name: &str,
        instance: u64,
        sender: mpsc::UnboundedSender<SessionCommand>,
        closing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            instance,
            sender,
            closing,
        }
    }

    pub fn id(&self) -> InfoHash {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Distinguishes successive sessions for the same torrent.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// True if both handles address the same live session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.id == other.id && self.instance == other.instance
    }

    /// True once teardown has started.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.sender.is_closed()
    }

    /// Attaches a connection for as long as the returned guard lives.
    pub fn attach(&self) -> ConnectionGuard {
        let _ = self.sender.send(SessionCommand::AddConnection);
        ConnectionGuard {
            sender: Some(self.sender.clone()),
        }
    }

    /// Reports that streaming from this session crossed the serving threshold.
    pub fn mark_serving(&self) {
        let _ = self.sender.send(SessionCommand::MarkServing);
    }

    /// # Errors
    /// - `SessionError::Destroyed` - Session was torn down
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|responder| SessionCommand::GetSnapshot { responder })
            .await
    }

    /// # Errors
    /// - `SessionError::Destroyed` - Session was torn down
    pub async fn playback(&self) -> Result<Playback, SessionError> {
        self.request(|responder| SessionCommand::GetPlayback { responder })
            .await
    }

    /// Opens a read stream over the main file, or `range` of it.
    ///
    /// # Errors
    /// - `SessionError::Destroyed` - Session was torn down
    /// - `SessionError::MainFileUnavailable` - Metadata has not been received
    pub async fn open_stream(&self, range: Option<ByteRange>) -> Result<ByteStream, SessionError> {
        self.request(|responder| SessionCommand::OpenStream { range, responder })
            .await?
    }

    /// # Errors
    /// - `SessionError::Destroyed` - Session was torn down
    pub async fn lifecycle_stats(&self) -> Result<LifecycleStats, SessionError> {
        self.request(|responder| SessionCommand::GetLifecycleStats { responder })
            .await
    }

    /// Destroys the session and waits for teardown to complete.
    ///
    /// Returns true if this call performed the teardown, false if the
    /// session was already destroyed or being destroyed by another caller.
    pub async fn destroy(&self) -> bool {
        self.request(|responder| SessionCommand::Destroy { responder })
            .await
            .is_ok()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(command(responder))
            .map_err(|_| SessionError::Destroyed)?;
        rx.await.map_err(|_| SessionError::Destroyed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("instance", &self.instance)
            .finish()
    }
}

/// One attached consumer of a session.
///
/// Dropping the guard detaches the connection exactly once, whether the
/// exchange completed or the client went away.
#[derive(Debug)]
pub struct ConnectionGuard {
    sender: Option<mpsc::UnboundedSender<SessionCommand>>,
}

impl ConnectionGuard {
    /// Detaches now instead of at drop.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(SessionCommand::RemoveConnection);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.detach();
    }
}
