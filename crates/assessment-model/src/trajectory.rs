//! Wrist motion signals.
//!
//! A [`WristTrajectory`] holds one vertical wrist position per frame in
//! which a hand was found. Frames without a detection are counted but
//! contribute no sample, so the trajectory is never longer than the clip.

use serde::{Deserialize, Serialize};

/// Fewest tracked samples for which signal conditioning is meaningful.
///
/// Below this the pipeline reports the hand as not detected.
pub const MIN_TRACKED_SAMPLES: usize = 10;

/// Raw wrist trajectory extracted from a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WristTrajectory {
    fps: f64,
    positions: Vec<f64>,
    frames_read: usize,
}

impl WristTrajectory {
    /// Empty trajectory for a clip with the given frame rate.
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            positions: Vec::new(),
            frames_read: 0,
        }
    }

    /// Trajectory in which every frame was tracked.
    pub fn from_positions(fps: f64, positions: Vec<f64>) -> Self {
        let frames_read = positions.len();
        Self {
            fps,
            positions,
            frames_read,
        }
    }

    /// Record one frame; `None` means no hand was found in it.
    pub fn push_frame(&mut self, position: Option<f64>) {
        self.frames_read += 1;
        if let Some(y) = position {
            self.positions.push(y);
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Frames decoded, tracked or not.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Whether enough samples were tracked to condition the signal.
    pub fn is_trackable(&self) -> bool {
        self.positions.len() >= MIN_TRACKED_SAMPLES
    }

    /// Fraction of decoded frames that yielded a sample.
    pub fn tracking_ratio(&self) -> f64 {
        if self.frames_read == 0 {
            0.0
        } else {
            self.positions.len() as f64 / self.frames_read as f64
        }
    }
}

/// Trajectory after zero-phase band-pass filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSignal {
    fps: f64,
    samples: Vec<f64>,
    low_hz: f64,
    high_hz: f64,
}

impl ConditionedSignal {
    pub fn new(fps: f64, samples: Vec<f64>, low_hz: f64, high_hz: f64) -> Self {
        Self {
            fps,
            samples,
            low_hz,
            high_hz,
        }
    }

    /// Sampling rate in Hz (the clip's frame rate).
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Pass band the signal was filtered with, in Hz.
    pub fn band_hz(&self) -> (f64, f64) {
        (self.low_hz, self.high_hz)
    }

    /// The trailing `window` samples, or the whole signal if shorter.
    pub fn tail(&self, window: usize) -> &[f64] {
        let start = self.samples.len().saturating_sub(window);
        &self.samples[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_frames_count_but_add_no_sample() {
        let mut trajectory = WristTrajectory::new(30.0);
        trajectory.push_frame(Some(0.41));
        trajectory.push_frame(None);
        trajectory.push_frame(Some(0.42));

        assert_eq!(trajectory.positions(), &[0.41, 0.42]);
        assert_eq!(trajectory.frames_read(), 3);
        assert!(trajectory.len() <= trajectory.frames_read());
        assert!((trajectory.tracking_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_trackable_threshold() {
        let nine = WristTrajectory::from_positions(30.0, vec![0.5; 9]);
        let ten = WristTrajectory::from_positions(30.0, vec![0.5; 10]);
        assert!(!nine.is_trackable());
        assert!(ten.is_trackable());
    }

    #[test]
    fn test_tail_window() {
        let signal = ConditionedSignal::new(30.0, (0..150).map(f64::from).collect(), 4.0, 6.0);
        assert_eq!(signal.tail(100).len(), 100);
        assert_eq!(signal.tail(100)[0], 50.0);

        let short = ConditionedSignal::new(30.0, vec![1.0, 2.0], 4.0, 6.0);
        assert_eq!(short.tail(100), &[1.0, 2.0]);
    }
}
