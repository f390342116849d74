//! Actor implementation for sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

use super::commands::{LifecycleStats, SessionCommand};
use super::handle::SessionHandle;
use super::state::Session;
use super::timer::TimerKind;
use crate::engine::EngineEvents;

/// Invoked exactly once after a session has been torn down.
pub type DestroyCallback = Box<dyn FnOnce() + Send>;

enum Step {
    Continue,
    Destroy(Option<oneshot::Sender<()>>),
}

/// Spawns the session actor and returns its handle.
///
/// The actor owns the session and processes commands, engine events and
/// timer deadlines one at a time, so connection changes and timer firings
/// can never interleave. It runs until the session is destroyed, either on
/// request, by the removal timer, or because every handle was dropped.
pub fn spawn_session(
    session: Session,
    events: EngineEvents,
    keep_data: bool,
    instance: u64,
    on_destroyed: DestroyCallback,
) -> SessionHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let closing = Arc::new(AtomicBool::new(false));
    let handle = SessionHandle::new(
        session.id(),
        session.display_name(),
        instance,
        sender,
        closing.clone(),
    );

    tokio::spawn(async move {
        run_actor_loop(session, receiver, events, closing, keep_data, on_destroyed).await;
    });

    handle
}

async fn run_actor_loop(
    mut session: Session,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut events: EngineEvents,
    closing: Arc<AtomicBool>,
    keep_data: bool,
    on_destroyed: DestroyCallback,
) {
    tracing::debug!("Session actor for {} started", session.id());
    let mut events_open = true;

    let responder = loop {
        let timer = session.next_timer();
        let deadline = timer.map_or_else(Instant::now, |(_, _, deadline)| deadline);

        // Commands first, so a connection queued before a deadline cancels it
        let step = tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(command) => handle_command(&mut session, command),
                None => Step::Destroy(None),
            },
            event = events.recv(), if events_open => {
                match event {
                    Some(event) => session.handle_event(event),
                    None => events_open = false,
                }
                Step::Continue
            }
            _ = sleep_until(deadline), if timer.is_some() => {
                match timer {
                    Some((kind, token, _)) if session.fire_timer(kind, token) => Step::Destroy(None),
                    _ => Step::Continue,
                }
            }
        };

        if let Step::Destroy(responder) = step {
            break responder;
        }
    };

    closing.store(true, Ordering::SeqCst);
    session.teardown(keep_data).await;
    on_destroyed();
    if let Some(responder) = responder {
        let _ = responder.send(());
    }

    tracing::debug!("Session actor for {} stopped", session.id());
}

/// Handles a single command. Returns `Step::Destroy` to end the actor.
fn handle_command(session: &mut Session, command: SessionCommand) -> Step {
    match command {
        SessionCommand::AddConnection => session.add_connection(),
        SessionCommand::RemoveConnection => session.remove_connection(),
        SessionCommand::MarkServing => session.mark_serving(),
        SessionCommand::GetSnapshot { responder } => {
            let _ = responder.send(session.snapshot());
        }
        SessionCommand::GetPlayback { responder } => {
            let _ = responder.send(session.playback());
        }
        SessionCommand::OpenStream { range, responder } => {
            let _ = responder.send(session.open_stream(range));
        }
        SessionCommand::GetLifecycleStats { responder } => {
            let timers = session.timers();
            let _ = responder.send(LifecycleStats {
                connections: session.connections(),
                paused: session.is_paused(),
                pause_armed: timers.is_armed(TimerKind::Pause),
                remove_armed: timers.is_armed(TimerKind::Remove),
                pause_scheduled: timers.scheduled(TimerKind::Pause),
                remove_scheduled: timers.scheduled(TimerKind::Remove),
            });
        }
        SessionCommand::Destroy { responder } => return Step::Destroy(Some(responder)),
    }
    Step::Continue
}
