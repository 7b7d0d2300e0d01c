//! Amplitude and dominant frequency of a conditioned signal.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use tremor_common::{TremorError, TremorResult};
use tremor_model::{ConditionedSignal, Measurement};

/// Options for the dominant-frequency search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Skip the zero-frequency bin. A residual offset in the signal would
    /// otherwise be reported as a 0 Hz "tremor".
    pub exclude_dc: bool,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self { exclude_dc: true }
    }
}

/// Amplitude and dominant frequency, always derived from the same signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralSummary {
    /// Population standard deviation of the signal.
    pub amplitude: f64,
    /// Frequency of the largest spectral magnitude, in Hz.
    pub dominant_frequency_hz: f64,
}

impl SpectralSummary {
    /// Summarize a conditioned signal sampled at its clip's frame rate.
    pub fn analyze(signal: &ConditionedSignal, config: &SpectrumConfig) -> TremorResult<Self> {
        let samples = signal.samples();
        let spectrum = one_sided_spectrum(samples)?;
        let first_bin = usize::from(config.exclude_dc && spectrum.len() > 1);

        let peak_bin = peak_bin(&spectrum, first_bin)
            .ok_or_else(|| TremorError::signal("spectrum has no candidate bins"))?;
        let dominant_frequency_hz = bin_frequency(peak_bin, samples.len(), signal.fps());

        Ok(Self {
            amplitude: std_dev(samples),
            dominant_frequency_hz,
        })
    }

    pub fn into_measurement(self) -> Measurement {
        Measurement::Detected {
            amplitude: self.amplitude,
            dominant_frequency_hz: self.dominant_frequency_hz,
        }
    }
}

/// Forward real FFT, bins `0..=n/2`.
pub fn one_sided_spectrum(samples: &[f64]) -> TremorResult<Vec<Complex<f64>>> {
    if samples.is_empty() {
        return Err(TremorError::signal("cannot transform an empty signal"));
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(samples.len());

    let mut input = samples.to_vec();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum)
        .map_err(|e| TremorError::signal(format!("FFT failed: {e}")))?;

    Ok(spectrum)
}

/// Index of the first largest magnitude at or after `first_bin`.
pub fn peak_bin(spectrum: &[Complex<f64>], first_bin: usize) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (k, c) in spectrum.iter().enumerate().skip(first_bin) {
        let magnitude = c.norm();
        match best {
            Some((_, m)) if magnitude <= m => {}
            _ => best = Some((k, magnitude)),
        }
    }
    best.map(|(k, _)| k)
}

/// Frequency in Hz of bin `k` of an `n`-point transform.
pub fn bin_frequency(k: usize, n: usize, sample_rate_hz: f64) -> f64 {
    k as f64 * sample_rate_hz / n as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
