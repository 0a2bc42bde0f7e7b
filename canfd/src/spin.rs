//! Bounded busy-waits on hardware handshakes
//!
//! The controller confirms halt/run transitions and bus idleness through
//! status bits with no completion interrupt, so the driver polls. Every
//! poll loop carries an iteration budget derived from the host clock so a
//! wedged controller degrades into an error instead of a hang.

use fugit::HertzU32;

/// Iteration budget covering roughly one millisecond
///
/// One loop iteration costs at least one host clock cycle, so spinning for
/// `host_clock / 1000` iterations waits at least that long.
pub(crate) fn one_ms_budget(host_clock: HertzU32) -> u32 {
    (host_clock.to_Hz() / 1000).max(1)
}

/// Counts down a poll-loop budget
pub(crate) struct Deadline {
    remaining: u32,
}

impl Deadline {
    pub(crate) fn new(budget: u32) -> Self {
        Self { remaining: budget }
    }

    /// Consumes one iteration; `true` once the budget is used up
    pub(crate) fn expired(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(remaining) => {
                self.remaining = remaining;
                false
            }
            None => true,
        }
    }
}
