//! Timers for the cooperative render loop.
//!
//! Nothing here sleeps or spawns. The host loop passes `now` in and asks for
//! the next deadline, so every timer is deterministic under test.

use std::time::{Duration, Instant};

/// Coalesces bursts of triggers into a single firing after `delay`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the countdown.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns true exactly once when the countdown has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Paces animation frames to a target rate independent of the host's
/// raster refresh.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame_time: Duration,
    then: Option<Instant>,
}

impl FramePacer {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            frame_time: frame_time(frame_rate),
            then: None,
        }
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.frame_time = frame_time(frame_rate);
    }

    /// Start counting from `now`; the first frame is due immediately.
    pub fn reset(&mut self) {
        self.then = None;
    }

    /// Whether a frame should be produced at `now`.
    ///
    /// The reference point advances by whole frames, keeping the remainder,
    /// so a slow host does not accumulate drift.
    pub fn due(&mut self, now: Instant) -> bool {
        let Some(then) = self.then else {
            self.then = Some(now);
            return true;
        };
        let delta = now.saturating_duration_since(then);
        if delta <= self.frame_time {
            return false;
        }
        let remainder = if self.frame_time.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos((delta.as_nanos() % self.frame_time.as_nanos()) as u64)
        };
        self.then = Some(now - remainder);
        true
    }

    /// When the next frame becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.then.map(|then| then + self.frame_time)
    }
}

fn frame_time(frame_rate: f64) -> Duration {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Duration::from_secs_f64(1.0 / frame_rate)
    } else {
        Duration::ZERO
    }
}
