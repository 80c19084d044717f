//! Decides when the ring's oldest label gets its next minute.

use crate::common::MS_PER_MINUTE;
use std::time::Duration;
use tracing::{debug, warn};

/// Where the watcher is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Polling until the oldest label is seen round the back.
    Seeking,
    /// Phase-locked: the next replacement is due at `next_due_ms`.
    Locked { next_due_ms: i64 },
}

/// What the clock should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    Idle,
    /// Reassign the oldest label now.
    Replace,
    /// Time moved in a way the ring cannot follow one minute at a time;
    /// rebuild every label.
    Reseed,
}

/// Fires one replacement per minute, each at a moment the oldest label is in
/// the hidden zone.
///
/// The first replacement is found by polling. After that the watcher locks on
/// and fires every sixty seconds, checking each time that the label really is
/// hidden. A failed check drops it back to polling.
#[derive(Debug)]
pub struct BoundaryWatcher {
    poll_interval_ms: i64,
    state: WatchState,
    last_poll_ms: Option<i64>,
}

impl BoundaryWatcher {
    /// `poll_interval` must be non-zero and shorter than a minute, as
    /// [`ClockConfig::validate`](crate::config::ClockConfig::validate) checks.
    /// Longer gaps between polls read as time jumps.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval_ms: poll_interval.as_millis() as i64,
            state: WatchState::Seeking,
            last_poll_ms: None,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Forgets any lock, as after the ring is reseeded.
    pub fn reset(&mut self) {
        self.state = WatchState::Seeking;
        self.last_poll_ms = None;
    }

    /// When the watcher next wants to be polled.
    pub fn next_wake_ms(&self, now_ms: i64) -> i64 {
        let poll_at = now_ms + self.poll_interval_ms;
        match self.state {
            WatchState::Seeking => poll_at,
            WatchState::Locked { next_due_ms } => next_due_ms.min(poll_at).max(now_ms),
        }
    }

    /// Polls at `now_ms`; `oldest_hidden` says whether the oldest label is
    /// currently in the hidden zone.
    pub fn poll(&mut self, now_ms: i64, oldest_hidden: bool) -> WatchDecision {
        if let Some(last) = self.last_poll_ms {
            let gap = now_ms - last;
            if !(0..MS_PER_MINUTE).contains(&gap) {
                warn!("Time moved {} ms between polls; reseeding labels.", gap);
                self.reset();
                self.last_poll_ms = Some(now_ms);
                return WatchDecision::Reseed;
            }
        }
        self.last_poll_ms = Some(now_ms);

        match self.state {
            WatchState::Seeking => {
                if oldest_hidden {
                    self.state = WatchState::Locked {
                        next_due_ms: now_ms + MS_PER_MINUTE,
                    };
                    debug!("Boundary watcher locked at {}.", now_ms);
                    WatchDecision::Replace
                } else {
                    WatchDecision::Idle
                }
            }
            WatchState::Locked { next_due_ms } if now_ms < next_due_ms => WatchDecision::Idle,
            WatchState::Locked { next_due_ms } => {
                if oldest_hidden {
                    self.state = WatchState::Locked {
                        next_due_ms: next_due_ms + MS_PER_MINUTE,
                    };
                    WatchDecision::Replace
                } else {
                    warn!("Oldest label not hidden at its due time; seeking again.");
                    self.state = WatchState::Seeking;
                    WatchDecision::Idle
                }
            }
        }
    }
}
