//! Idle lifecycle: connection reference counting with pause and removal
//! timers.
//!
//! When the last connection detaches a pause timer starts. If it elapses
//! with no connection attached the session is paused and a removal timer
//! starts; if that one elapses too the session is destroyed. Any new
//! connection cancels both timers.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::timer::{SessionTimers, TimerKind};

/// Action the owning session must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Re-select the main file and clear `paused`
    Resume,
    /// Deselect the main file and set `paused`
    Pause,
    /// Tear the session down
    Destroy,
}

#[derive(Debug, Clone)]
pub struct IdleLifecycle {
    connections: usize,
    pause_delay: Duration,
    remove_delay: Duration,
}

impl IdleLifecycle {
    pub fn new(pause_delay: Duration, remove_delay: Duration) -> Self {
        Self {
            connections: 0,
            pause_delay,
            remove_delay,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections
    }

    /// Attaches a connection, cancelling any pending pause or removal.
    pub fn add_connection(&mut self, timers: &mut SessionTimers, paused: bool) -> Option<IdleAction> {
        self.connections += 1;
        timers.cancel(TimerKind::Pause);
        timers.cancel(TimerKind::Remove);
        paused.then_some(IdleAction::Resume)
    }

    /// Detaches a connection; the last one out starts the pause timer.
    pub fn remove_connection(&mut self, timers: &mut SessionTimers, now: Instant) {
        if self.connections == 0 {
            warn!("Connection released with no connections attached");
            return;
        }
        self.connections -= 1;
        if self.connections == 0 {
            timers.arm(TimerKind::Pause, now + self.pause_delay);
        }
    }

    /// Pause timer elapsed: pause and schedule removal if still unattended.
    pub fn on_pause_elapsed(&mut self, timers: &mut SessionTimers, now: Instant) -> Option<IdleAction> {
        if self.connections > 0 {
            return None;
        }
        timers.arm(TimerKind::Remove, now + self.remove_delay);
        Some(IdleAction::Pause)
    }

    /// Removal timer elapsed: destroy if still unattended.
    pub fn on_remove_elapsed(&self) -> Option<IdleAction> {
        (self.connections == 0).then_some(IdleAction::Destroy)
    }
}
