//! Command definitions for the session actor.

use tokio::sync::oneshot;

use super::SessionError;
use super::snapshot::SessionSnapshot;
use super::state::Playback;
use crate::engine::ByteStream;
use crate::streaming::ByteRange;

/// Commands that can be sent to a session actor.
///
/// Connection bookkeeping is fire-and-forget so it can be issued from
/// `Drop`; queries carry a response channel.
pub enum SessionCommand {
    /// A consumer attached
    AddConnection,
    /// A consumer detached
    RemoveConnection,
    /// Streaming crossed the serving threshold
    MarkServing,
    GetSnapshot {
        responder: oneshot::Sender<SessionSnapshot>,
    },
    GetPlayback {
        responder: oneshot::Sender<Playback>,
    },
    /// Open a read stream over the main file.
    OpenStream {
        range: Option<ByteRange>,
        responder: oneshot::Sender<Result<ByteStream, SessionError>>,
    },
    GetLifecycleStats {
        responder: oneshot::Sender<LifecycleStats>,
    },
    /// Tear the session down. Only the first destroy is answered.
    Destroy { responder: oneshot::Sender<()> },
}

/// Idle lifecycle state exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleStats {
    pub connections: usize,
    pub paused: bool,
    pub pause_armed: bool,
    pub remove_armed: bool,
    /// Pause timers scheduled over the session's life
    pub pause_scheduled: u32,
    /// Remove timers scheduled over the session's life
    pub remove_scheduled: u32,
}
