//! Per-handle supervision state machine
//!
//! Pure bookkeeping for one supervised handle: which phase it is in, when
//! its single backoff timer is due, and how many degraded episodes it has
//! seen since it was last live. The supervisor task feeds it connection
//! statuses, timer expiries and lifecycle transitions, and carries out the
//! [`Decision`] it returns.
//!
//! # Phases
//!
//! ```text
//!            degraded                  timer (foreground)
//!  Active ───────────▶ PendingReconnect ─────────────────▶ Active
//!    ▲  ╲                    │ timer (background)
//!    │   ╲ closed /          ▼
//!    │    ╲ gave up    AwaitingForeground
//!    │     ▼                 │ foregrounded
//!    │   Halted              │
//!    └───────────────────────┘
//! ```
//!
//! Returning to the foreground also replaces an `Active` connection that
//! never went live. A manual reconnect moves any phase but `Stopped` back
//! to `Active`.
//! `Stopped` is terminal and only reached through unsupervise.

use crate::reconnect::ReconnectionStrategy;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Where a supervised handle is in its reconnect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionPhase {
    /// A connection is open (connecting or live)
    Active,
    /// The connection degraded and a backoff timer is running
    PendingReconnect,
    /// The timer fired in the background; reconnect on foreground
    AwaitingForeground,
    /// Closed by the transport, or the strategy gave up; only a manual
    /// reconnect restarts it
    Halted,
    /// Unsupervised; nothing restarts it
    Stopped,
}

/// What the supervisor task should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Nothing,
    /// A timer was armed for this long
    Scheduled(Duration),
    /// Close the current connection and open a fresh one now
    ReconnectNow,
    /// The timer fired in the background
    Deferred,
    /// The strategy declined another attempt
    GaveUp,
}

pub(crate) struct SupervisionState {
    phase: SupervisionPhase,
    deadline: Option<Instant>,
    attempt: u32,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl SupervisionState {
    pub(crate) fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            phase: SupervisionPhase::Active,
            deadline: None,
            attempt: 0,
            strategy,
        }
    }

    pub(crate) fn phase(&self) -> SupervisionPhase {
        self.phase
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Degraded episodes since the connection was last live
    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The current connection degraded (or could not be opened)
    ///
    /// Only an `Active` handle arms a timer, which keeps at most one timer
    /// per handle however many errors arrive.
    pub(crate) fn on_degraded(&mut self, now: Instant) -> Decision {
        if self.phase != SupervisionPhase::Active {
            return Decision::Nothing;
        }
        match self.strategy.next_delay(self.attempt) {
            Some(delay) => {
                self.attempt = self.attempt.saturating_add(1);
                self.phase = SupervisionPhase::PendingReconnect;
                self.deadline = Some(now + delay);
                Decision::Scheduled(delay)
            }
            None => {
                self.phase = SupervisionPhase::Halted;
                self.deadline = None;
                Decision::GaveUp
            }
        }
    }

    /// The current connection reached live, possibly by recovering on its
    /// own while a timer was pending
    pub(crate) fn on_live(&mut self) {
        self.attempt = 0;
        self.strategy.reset();
        if matches!(
            self.phase,
            SupervisionPhase::PendingReconnect | SupervisionPhase::AwaitingForeground
        ) {
            self.phase = SupervisionPhase::Active;
            self.deadline = None;
        }
    }

    /// The transport closed the connection on purpose
    pub(crate) fn on_closed(&mut self) {
        if self.phase != SupervisionPhase::Stopped {
            self.phase = SupervisionPhase::Halted;
            self.deadline = None;
        }
    }

    pub(crate) fn on_timer(&mut self, foreground: bool) -> Decision {
        if self.phase != SupervisionPhase::PendingReconnect {
            return Decision::Nothing;
        }
        self.deadline = None;
        if foreground {
            self.phase = SupervisionPhase::Active;
            Decision::ReconnectNow
        } else {
            self.phase = SupervisionPhase::AwaitingForeground;
            Decision::Deferred
        }
    }

    /// The app came back to the foreground
    ///
    /// Every handle whose connection is not live is reconnected, including
    /// an `Active` one stuck connecting while the app was away. `Halted`
    /// handles stay down.
    pub(crate) fn on_foreground(&mut self, live: bool) -> Decision {
        match self.phase {
            SupervisionPhase::PendingReconnect | SupervisionPhase::AwaitingForeground => {
                self.phase = SupervisionPhase::Active;
                self.deadline = None;
                Decision::ReconnectNow
            }
            SupervisionPhase::Active if !live => Decision::ReconnectNow,
            _ => Decision::Nothing,
        }
    }

    pub(crate) fn on_manual(&mut self) -> Decision {
        if self.phase == SupervisionPhase::Stopped {
            return Decision::Nothing;
        }
        self.phase = SupervisionPhase::Active;
        self.deadline = None;
        self.attempt = 0;
        self.strategy.reset();
        Decision::ReconnectNow
    }

    pub(crate) fn stop(&mut self) {
        self.phase = SupervisionPhase::Stopped;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::{FixedDelay, NoReconnect};

    fn flat() -> SupervisionState {
        SupervisionState::new(Box::new(FixedDelay::default()))
    }

    #[test]
    fn test_degraded_arms_one_timer() {
        let mut state = flat();
        let now = Instant::now();

        assert_eq!(state.on_degraded(now), Decision::Scheduled(Duration::from_secs(5)));
        assert_eq!(state.phase(), SupervisionPhase::PendingReconnect);
        assert_eq!(state.deadline(), Some(now + Duration::from_secs(5)));

        // A second error while pending does not move the deadline
        assert_eq!(state.on_degraded(now + Duration::from_secs(2)), Decision::Nothing);
        assert_eq!(state.deadline(), Some(now + Duration::from_secs(5)));
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn test_timer_in_foreground_reconnects() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        assert_eq!(state.on_timer(true), Decision::ReconnectNow);
        assert_eq!(state.phase(), SupervisionPhase::Active);
        assert!(state.deadline().is_none());
    }

    #[test]
    fn test_timer_in_background_defers() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        assert_eq!(state.on_timer(false), Decision::Deferred);
        assert_eq!(state.phase(), SupervisionPhase::AwaitingForeground);

        assert_eq!(state.on_foreground(false), Decision::ReconnectNow);
        assert_eq!(state.phase(), SupervisionPhase::Active);
    }

    #[test]
    fn test_foreground_cancels_pending_timer() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        assert_eq!(state.on_foreground(false), Decision::ReconnectNow);
        assert!(state.deadline().is_none());
        // The old timer no longer applies
        assert_eq!(state.on_timer(true), Decision::Nothing);
    }

    #[test]
    fn test_foreground_reconnects_active_until_live() {
        let mut state = flat();
        assert_eq!(state.on_foreground(false), Decision::ReconnectNow);
        assert_eq!(state.phase(), SupervisionPhase::Active);
        assert_eq!(state.on_foreground(true), Decision::Nothing);
    }

    #[test]
    fn test_foreground_leaves_halted_alone() {
        let mut state = flat();
        state.on_closed();
        assert_eq!(state.phase(), SupervisionPhase::Halted);
        assert_eq!(state.on_foreground(false), Decision::Nothing);
        assert_eq!(state.on_degraded(Instant::now()), Decision::Nothing);
    }

    #[test]
    fn test_closed_cancels_timer() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        state.on_closed();
        assert!(state.deadline().is_none());
        assert_eq!(state.on_timer(true), Decision::Nothing);
    }

    #[test]
    fn test_strategy_gives_up() {
        let mut state = SupervisionState::new(Box::new(NoReconnect));
        assert_eq!(state.on_degraded(Instant::now()), Decision::GaveUp);
        assert_eq!(state.phase(), SupervisionPhase::Halted);
    }

    #[test]
    fn test_attempts_count_until_live() {
        let mut state = SupervisionState::new(Box::new(FixedDelay::new(Duration::from_secs(1)).with_max_attempts(2)));
        let now = Instant::now();

        assert!(matches!(state.on_degraded(now), Decision::Scheduled(_)));
        state.on_timer(true);
        assert!(matches!(state.on_degraded(now), Decision::Scheduled(_)));
        state.on_timer(true);
        assert_eq!(state.on_degraded(now), Decision::GaveUp);

        let mut state = SupervisionState::new(Box::new(FixedDelay::new(Duration::from_secs(1)).with_max_attempts(2)));
        state.on_degraded(now);
        state.on_timer(true);
        state.on_live();
        assert_eq!(state.attempts(), 0);
        assert!(matches!(state.on_degraded(now), Decision::Scheduled(_)));
    }

    #[test]
    fn test_self_recovery_cancels_timer() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        state.on_live();
        assert_eq!(state.phase(), SupervisionPhase::Active);
        assert!(state.deadline().is_none());
    }

    #[test]
    fn test_manual_restarts_halted() {
        let mut state = flat();
        state.on_closed();
        assert_eq!(state.on_manual(), Decision::ReconnectNow);
        assert_eq!(state.phase(), SupervisionPhase::Active);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let mut state = flat();
        state.on_degraded(Instant::now());
        state.stop();
        assert!(state.deadline().is_none());
        assert_eq!(state.on_manual(), Decision::Nothing);
        assert_eq!(state.on_foreground(false), Decision::Nothing);
        state.on_closed();
        assert_eq!(state.phase(), SupervisionPhase::Stopped);
    }
}
