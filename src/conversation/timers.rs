//! Deadlines owned by the controller
//!
//! The controller never sleeps. It arms deadlines here, the driver asks for
//! the earliest one and calls back when it passes. Cancelling a timer removes
//! it, so a cancelled loop can never fire late.

use std::time::{Duration, Instant};

/// A periodic timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeating {
    period: Duration,
    next: Instant,
}

impl Repeating {
    pub fn starting_at(now: Instant, period: Duration) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    pub fn next(&self) -> Instant {
        self.next
    }

    /// Advance past `now` if due, returning whether the timer fired
    ///
    /// Missed periods are skipped rather than replayed.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        while self.next <= now {
            self.next += self.period;
        }
        true
    }
}

/// Every timer the conversation can have armed
#[derive(Debug, Default, Clone)]
pub struct Timers {
    /// Loudness sampling loop (listening only)
    pub sampling: Option<Repeating>,
    /// Recording boundary check (listening only)
    pub boundary: Option<Repeating>,
    /// Playback completion check (speaking only)
    pub playback_watch: Option<Repeating>,
    /// Timeout for the in-flight exchange (processing only)
    pub exchange_deadline: Option<Instant>,
}

impl Timers {
    /// Cancel both listening loops
    pub fn cancel_listening(&mut self) {
        self.sampling = None;
        self.boundary = None;
    }

    pub fn clear(&mut self) {
        *self = Timers::default();
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.sampling.map(|t| t.next()),
            self.boundary.map(|t| t.next()),
            self.playback_watch.map(|t| t.next()),
            self.exchange_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn pending_count(&self) -> usize {
        [
            self.sampling.is_some(),
            self.boundary.is_some(),
            self.playback_watch.is_some(),
            self.exchange_deadline.is_some(),
        ]
        .into_iter()
        .filter(|armed| *armed)
        .count()
    }
}
