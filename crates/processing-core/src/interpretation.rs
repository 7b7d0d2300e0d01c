//! Threshold rules turning a measurement into text and an alert.
//!
//! Rules apply in order and the frequency rules are mutually exclusive.
//! The elevated-amplitude note is appended on top of whichever frequency
//! rule matched. Thresholds compare unrounded values.

use tremor_model::{Interpretation, Measurement};

/// Inclusive frequency range of pathological (rest/essential) tremor, in Hz.
pub const PATHOLOGICAL_RANGE_HZ: (f64, f64) = (4.0, 6.0);

/// Frequency from which oscillation reads as physiological tremor, in Hz.
pub const PHYSIOLOGICAL_MIN_HZ: f64 = 8.0;

/// Amplitude above which the elevated-amplitude note is added.
pub const ELEVATED_AMPLITUDE: f64 = 0.002;

pub const HAND_NOT_DETECTED: &str = "hand not detected";
pub const PATHOLOGICAL_TEXT: &str = "4\u{2013}6 Hz oscillation: possible pathological tremor";
pub const PATHOLOGICAL_ALERT: &str = "suspected tremor detected";
pub const PHYSIOLOGICAL_TEXT: &str = "possible physiological tremor (stress, fatigue, cold)";
pub const NORMAL_TEXT: &str = "normal movement";
pub const ELEVATED_AMPLITUDE_TEXT: &str = "elevated amplitude observed";

/// Joins the elevated-amplitude note to the frequency text.
pub const NOTE_SEPARATOR: &str = "; ";

/// Interpret a measurement.
pub fn interpret(measurement: &Measurement) -> Interpretation {
    let (amplitude, frequency) = match *measurement {
        Measurement::Detected {
            amplitude,
            dominant_frequency_hz,
        } => (amplitude, dominant_frequency_hz),
        Measurement::Undetected => {
            return Interpretation {
                text: HAND_NOT_DETECTED.to_string(),
                alert: None,
            }
        }
    };

    let (low, high) = PATHOLOGICAL_RANGE_HZ;
    let (mut text, alert) = if (low..=high).contains(&frequency) {
        (PATHOLOGICAL_TEXT.to_string(), Some(PATHOLOGICAL_ALERT.to_string()))
    } else if frequency >= PHYSIOLOGICAL_MIN_HZ {
        (PHYSIOLOGICAL_TEXT.to_string(), None)
    } else {
        (NORMAL_TEXT.to_string(), None)
    };

    if amplitude > ELEVATED_AMPLITUDE {
        text.push_str(NOTE_SEPARATOR);
        text.push_str(ELEVATED_AMPLITUDE_TEXT);
    }

    Interpretation { text, alert }
}
