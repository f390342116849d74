//! Cancellable per-session timers.
//!
//! Each timer kind has at most one outstanding deadline. Arming a kind
//! replaces its previous deadline and issues a fresh token; a firing is only
//! honored when it carries the token currently stored for that kind, so a
//! cancelled or superseded timer can never act.

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Metadata,
    Pause,
    Remove,
}

/// Identifies one arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    token: TimerToken,
    deadline: Instant,
}

/// The metadata, pause and remove timers of one session.
#[derive(Debug, Default)]
pub struct SessionTimers {
    metadata: Option<ArmedTimer>,
    pause: Option<ArmedTimer>,
    remove: Option<ArmedTimer>,
    next_token: u64,
    scheduled: [u32; 3],
}

impl SessionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind` to fire at `deadline`, replacing any outstanding timer of
    /// the same kind.
    pub fn arm(&mut self, kind: TimerKind, deadline: Instant) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        *self.slot(kind) = Some(ArmedTimer { token, deadline });
        self.scheduled[Self::index(kind)] += 1;
        token
    }

    /// Cancels `kind`. Returns true if a timer was outstanding.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slot(kind).take().is_some()
    }

    pub fn cancel_all(&mut self) {
        self.metadata = None;
        self.pause = None;
        self.remove = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.get(kind).is_some()
    }

    /// Earliest outstanding timer.
    pub fn next_due(&self) -> Option<(TimerKind, TimerToken, Instant)> {
        [TimerKind::Metadata, TimerKind::Pause, TimerKind::Remove]
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|t| (kind, t.token, t.deadline)))
            .min_by_key(|(_, _, deadline)| *deadline)
    }

    /// Consumes the timer if `token` is still the current arming of `kind`.
    pub fn fire(&mut self, kind: TimerKind, token: TimerToken) -> bool {
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(|armed| armed.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// How many times `kind` has been armed over the session's life.
    pub fn scheduled(&self, kind: TimerKind) -> u32 {
        self.scheduled[Self::index(kind)]
    }

    fn index(kind: TimerKind) -> usize {
        match kind {
            TimerKind::Metadata => 0,
            TimerKind::Pause => 1,
            TimerKind::Remove => 2,
        }
    }

    fn get(&self, kind: TimerKind) -> Option<&ArmedTimer> {
        match kind {
            TimerKind::Metadata => self.metadata.as_ref(),
            TimerKind::Pause => self.pause.as_ref(),
            TimerKind::Remove => self.remove.as_ref(),
        }
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Metadata => &mut self.metadata,
            TimerKind::Pause => &mut self.pause,
            TimerKind::Remove => &mut self.remove,
        }
    }
}
