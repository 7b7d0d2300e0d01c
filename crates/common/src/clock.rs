//! Frame timing and attempt deadlines.
//!
//! Video frames are stamped by accumulating the nominal frame interval
//! (`1000 / fps` milliseconds) so the landmark detector always sees a
//! strictly increasing timestamp, regardless of container timestamps.
//! Each analysis attempt carries a [`Deadline`] built from the soft and
//! hard time limits.

use crate::error::{TremorError, TremorResult};
use std::time::{Duration, Instant};

/// Accumulating frame clock for detector timestamps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval_ms: f64,
    elapsed_ms: f64,
}

impl FrameClock {
    /// Create a clock for the given frame rate.
    pub fn new(fps: f64) -> TremorResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(TremorError::invalid_input(format!(
                "frame rate must be positive, got {fps}"
            )));
        }
        Ok(Self {
            interval_ms: 1000.0 / fps,
            elapsed_ms: 0.0,
        })
    }

    /// Timestamp for the current frame in whole milliseconds, then advance.
    ///
    /// The fractional part is kept internally so rounding does not drift.
    pub fn tick(&mut self) -> u64 {
        let stamp = self.elapsed_ms as u64;
        self.elapsed_ms += self.interval_ms;
        stamp
    }

    /// Nominal frame interval in milliseconds.
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }
}

/// Soft and hard wall-clock bounds for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl TimeLimits {
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self { soft, hard }
    }

    /// Start a deadline anchored to now.
    pub fn start(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            soft: self.soft,
        }
    }
}

/// Running soft deadline, checked cooperatively between units of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    soft: Duration,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            soft: Duration::MAX,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.soft
    }

    /// Fail with a time-limit error once the soft limit has passed.
    pub fn check(&self, stage: &str) -> TremorResult<()> {
        if self.is_expired() {
            return Err(TremorError::time_limit(format!(
                "soft limit of {}s reached during {stage}",
                self.soft.as_secs()
            )));
        }
        Ok(())
    }
}
