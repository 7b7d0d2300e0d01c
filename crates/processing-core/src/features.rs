//! Classifier feature extraction.
//!
//! The feature set is versioned: a classifier exported for one set refuses
//! vectors of another. Any change to what is computed here must come with
//! a new [`FEATURE_SET`] identifier and a retrained model.
//!
//! All features are expressed in normalized position units, so the
//! severity heuristic over the whole vector stays dimensionally consistent.

use serde::{Deserialize, Serialize};
use tremor_common::{TremorError, TremorResult};
use tremor_model::ConditionedSignal;

use crate::spectrum::{bin_frequency, one_sided_spectrum, peak_bin, std_dev};

/// Identifier of the feature composition below.
pub const FEATURE_SET: &str = "wrist-motion-v1";

/// Trailing samples of the conditioned signal used for features.
pub const FEATURE_WINDOW: usize = 100;

/// Band edges in Hz for the band-power features. The last band runs to
/// the Nyquist frequency.
pub const BAND_EDGES_HZ: [f64; 9] = [0.0, 0.5, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0];

/// Names of the features, in vector order.
pub const FEATURE_NAMES: [&str; 16] = [
    "mean_abs",
    "std",
    "rms",
    "peak_to_peak",
    "max_abs",
    "mean_abs_diff",
    "dominant_component_amplitude",
    "band_rms_0_0.5hz",
    "band_rms_0.5_2hz",
    "band_rms_2_3hz",
    "band_rms_3_4hz",
    "band_rms_4_5hz",
    "band_rms_5_6hz",
    "band_rms_6_8hz",
    "band_rms_8_10hz",
    "band_rms_10hz_nyquist",
];

/// Number of values in a vector of [`FEATURE_SET`].
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Feature values tagged with the feature set that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    feature_set: String,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(feature_set: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            feature_set: feature_set.into(),
            values,
        }
    }

    pub fn feature_set(&self) -> &str {
        &self.feature_set
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compute the [`FEATURE_SET`] vector over the trailing window of `signal`.
pub fn extract_features(signal: &ConditionedSignal) -> TremorResult<FeatureVector> {
    let window = signal.tail(FEATURE_WINDOW);
    if window.is_empty() {
        return Err(TremorError::signal("cannot extract features from an empty signal"));
    }
    let n = window.len();
    let len = n as f64;

    let mean_abs = window.iter().map(|v| v.abs()).sum::<f64>() / len;
    let std = std_dev(window);
    let rms = (window.iter().map(|v| v * v).sum::<f64>() / len).sqrt();
    let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = window.iter().copied().fold(f64::INFINITY, f64::min);
    let max_abs = window.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let mean_abs_diff = if n > 1 {
        window.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (len - 1.0)
    } else {
        0.0
    };

    // One-sided power per bin; summing all bins gives mean(x^2).
    let spectrum = one_sided_spectrum(window)?;
    let power: Vec<f64> = spectrum
        .iter()
        .enumerate()
        .map(|(k, c)| {
            let p = c.norm_sqr() / (len * len);
            if k == 0 || (n % 2 == 0 && k == n / 2) {
                p
            } else {
                2.0 * p
            }
        })
        .collect();

    let dominant_amplitude = if spectrum.len() > 1 {
        peak_bin(&spectrum, 1)
            .map(|k| (2.0 * power[k]).sqrt())
            .unwrap_or(0.0)
    } else {
        0.0
    };

    let mut values = vec![
        mean_abs,
        std,
        rms,
        max - min,
        max_abs,
        mean_abs_diff,
        dominant_amplitude,
    ];

    let fps = signal.fps();
    for (i, &low) in BAND_EDGES_HZ.iter().enumerate() {
        let high = BAND_EDGES_HZ.get(i + 1).copied().unwrap_or(f64::INFINITY);
        let band_power: f64 = power
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(k, _)| {
                let f = bin_frequency(*k, n, fps);
                f >= low && f < high
            })
            .map(|(_, p)| p)
            .sum();
        values.push(band_power.sqrt());
    }

    debug_assert_eq!(values.len(), FEATURE_COUNT);
    Ok(FeatureVector::new(FEATURE_SET, values))
}
