//! Countdown clock of an attempt.
//!
//! The timer does not own a thread or a task. Its host calls [`CountdownTimer::tick`]
//! roughly once per second with the current wall-clock time; the timer
//! charges the whole seconds that actually elapsed since its last tick, so a
//! host that was starved (a backgrounded tab, a stalled runtime) catches up
//! instead of drifting behind real time.

use chrono::{DateTime, Duration, Utc};

/// What a single tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Timer is stopped, or less than a second passed.
    Idle,
    /// Time was charged; `remaining` seconds are left.
    Tick { remaining: u32 },
    /// Remaining time reached zero. Reported once per start, after which the
    /// timer stops itself.
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownTimer {
    remaining: u32,
    last_tick: Option<DateTime<Utc>>,
    expired: bool,
}

impl CountdownTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting down from `initial_secs`. No-op while running.
    pub fn start(&mut self, initial_secs: u32, now: DateTime<Utc>) {
        if self.is_running() {
            return;
        }
        self.remaining = initial_secs;
        self.last_tick = Some(now);
        self.expired = false;
    }

    /// Halts the countdown. Idempotent.
    pub fn stop(&mut self) {
        self.last_tick = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.expired
    }

    /// Charges the wall-clock time elapsed since the previous tick.
    ///
    /// Sub-second remainders carry over to the next tick. A clock that moved
    /// backwards charges nothing.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerEvent {
        let Some(last) = self.last_tick else {
            return TimerEvent::Idle;
        };

        let elapsed = (now - last).num_seconds();
        if elapsed <= 0 && self.remaining > 0 {
            return TimerEvent::Idle;
        }

        let elapsed = elapsed.max(0);
        let charged = u32::try_from(elapsed).unwrap_or(u32::MAX).min(self.remaining);
        self.remaining -= charged;
        self.last_tick = Some(last + Duration::seconds(elapsed));

        if self.remaining > 0 {
            return TimerEvent::Tick {
                remaining: self.remaining,
            };
        }

        self.stop();
        if self.expired {
            TimerEvent::Idle
        } else {
            self.expired = true;
            TimerEvent::Expired
        }
    }
}
