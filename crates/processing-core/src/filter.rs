//! Age-adjusted band-pass conditioning of wrist trajectories.
//!
//! The filter is a digital Butterworth band-pass designed the classic way:
//! analog low-pass prototype, frequency pre-warping, low-pass to band-pass
//! transform, bilinear transform, then expansion of zeros and poles into
//! transfer-function coefficients. It is applied forward and backward so the
//! conditioned signal has no phase delay relative to the video.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use realfft::num_complex::Complex;
use tremor_common::{TremorError, TremorResult};
use tremor_model::{ConditionedSignal, WristTrajectory};

type C64 = Complex<f64>;

/// Order of the low-pass prototype (the band-pass has twice this order).
pub const FILTER_ORDER: usize = 4;

/// Bilinear transform constant for a normalized sample rate of 2.
const BILINEAR_FS2: f64 = 4.0;

/// Pass band of the conditioning filter, in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl PassBand {
    pub fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    /// Band for a patient of the given age.
    ///
    /// Under 40: 4.5-6.5 Hz. 40 to 70 inclusive: 4.0-6.0 Hz. Over 70: 3.5-5.5 Hz.
    pub fn for_age(age: u32) -> Self {
        match age {
            0..=39 => Self::new(4.5, 6.5),
            40..=70 => Self::new(4.0, 6.0),
            _ => Self::new(3.5, 5.5),
        }
    }

    pub fn center_hz(&self) -> f64 {
        (self.low_hz * self.high_hz).sqrt()
    }
}

/// Digital IIR band-pass filter in transfer-function form.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    b: Vec<f64>,
    a: Vec<f64>,
    /// Steady-state initial conditions for a unit step input.
    zi: Vec<f64>,
    band: PassBand,
    sample_rate_hz: f64,
}

impl BandpassFilter {
    /// Design a Butterworth band-pass of the given prototype order.
    pub fn butterworth(order: usize, band: PassBand, sample_rate_hz: f64) -> TremorResult<Self> {
        if order == 0 {
            return Err(TremorError::invalid_input("filter order must be at least 1"));
        }
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(TremorError::invalid_input(format!(
                "sample rate must be positive, got {sample_rate_hz}"
            )));
        }
        let nyquist = sample_rate_hz / 2.0;
        if !(band.low_hz > 0.0 && band.low_hz < band.high_hz && band.high_hz < nyquist) {
            return Err(TremorError::invalid_input(format!(
                "pass band {:.2}-{:.2} Hz does not fit below the Nyquist frequency {:.2} Hz",
                band.low_hz, band.high_hz, nyquist
            )));
        }

        let n = order as f64;
        let prototype: Vec<C64> = (0..order)
            .map(|i| {
                let m = -n + 1.0 + 2.0 * i as f64;
                -C64::new(0.0, PI * m / (2.0 * n)).exp()
            })
            .collect();

        let warped_low = BILINEAR_FS2 * (PI * band.low_hz / nyquist / 2.0).tan();
        let warped_high = BILINEAR_FS2 * (PI * band.high_hz / nyquist / 2.0).tan();
        let bandwidth = warped_high - warped_low;
        let center = (warped_low * warped_high).sqrt();

        // Low-pass to band-pass: each prototype pole splits into two, and
        // `order` zeros appear at the origin.
        let scaled: Vec<C64> = prototype.iter().map(|&p| p * (bandwidth / 2.0)).collect();
        let center_sq = C64::new(center * center, 0.0);
        let mut analog_poles = Vec::with_capacity(2 * order);
        analog_poles.extend(scaled.iter().map(|&p| p + (p * p - center_sq).sqrt()));
        analog_poles.extend(scaled.iter().map(|&p| p - (p * p - center_sq).sqrt()));
        let analog_zeros = vec![C64::new(0.0, 0.0); order];
        let analog_gain = bandwidth.powi(order as i32);

        let fs2 = C64::new(BILINEAR_FS2, 0.0);
        let zeros: Vec<C64> = analog_zeros
            .iter()
            .map(|&z| (fs2 + z) / (fs2 - z))
            .chain(std::iter::repeat(C64::new(-1.0, 0.0)).take(order))
            .collect();
        let poles: Vec<C64> = analog_poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
        let zero_product: C64 = analog_zeros.iter().map(|&z| fs2 - z).product();
        let pole_product: C64 = analog_poles.iter().map(|&p| fs2 - p).product();
        let gain = analog_gain * (zero_product / pole_product).re;

        let b: Vec<f64> = expand_roots(&zeros).iter().map(|c| c.re * gain).collect();
        let a: Vec<f64> = expand_roots(&poles).iter().map(|c| c.re).collect();
        let zi = steady_state(&b, &a)?;

        Ok(Self {
            b,
            a,
            zi,
            band,
            sample_rate_hz,
        })
    }

    /// Numerator coefficients.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Denominator coefficients, normalized so `a[0] == 1`.
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn band(&self) -> PassBand {
        self.band
    }

    /// Magnitude of the frequency response at `hz`.
    pub fn magnitude_at(&self, hz: f64) -> f64 {
        let w = 2.0 * PI * hz / self.sample_rate_hz;
        let z_inv = C64::new(0.0, -w).exp();
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .rev()
                .fold(C64::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Single-pass filtering (transposed direct form II) from the given state.
    pub fn lfilter(&self, input: &[f64], initial_state: &[f64]) -> Vec<f64> {
        let order = self.a.len() - 1;
        let mut state = initial_state.to_vec();
        state.resize(order, 0.0);

        let mut output = Vec::with_capacity(input.len());
        for &x in input {
            let y = self.b[0] * x + state.first().copied().unwrap_or(0.0);
            for i in 0..order {
                let next = if i + 1 < order { state[i + 1] } else { 0.0 };
                state[i] = self.b[i + 1] * x + next - self.a[i + 1] * y;
            }
            output.push(y);
        }
        output
    }

    /// Zero-phase forward-backward filtering with odd edge extension.
    ///
    /// The extension length is three times the filter length, shortened to
    /// `len - 1` for short signals.
    pub fn filtfilt(&self, input: &[f64]) -> TremorResult<Vec<f64>> {
        let n = input.len();
        if n < 2 {
            return Err(TremorError::invalid_input(format!(
                "zero-phase filtering needs at least 2 samples, got {n}"
            )));
        }
        let padlen = (3 * self.a.len().max(self.b.len())).min(n - 1);
        let extended = odd_extend(input, padlen);

        let x0 = extended[0];
        let zi_forward: Vec<f64> = self.zi.iter().map(|z| z * x0).collect();
        let mut pass = self.lfilter(&extended, &zi_forward);
        pass.reverse();

        let y0 = pass[0];
        let zi_backward: Vec<f64> = self.zi.iter().map(|z| z * y0).collect();
        let mut output = self.lfilter(&pass, &zi_backward);
        output.reverse();

        Ok(output[padlen..padlen + n].to_vec())
    }
}

/// Condition a trajectory with the pass band for the patient's age.
///
/// The trajectory must hold at least
/// [`MIN_TRACKED_SAMPLES`](tremor_model::MIN_TRACKED_SAMPLES) samples.
pub fn condition(trajectory: &WristTrajectory, patient_age: u32) -> TremorResult<ConditionedSignal> {
    if !trajectory.is_trackable() {
        return Err(TremorError::invalid_input(format!(
            "cannot condition a trajectory of {} samples",
            trajectory.len()
        )));
    }

    let band = PassBand::for_age(patient_age);
    let filter = BandpassFilter::butterworth(FILTER_ORDER, band, trajectory.fps())?;
    let samples = filter.filtfilt(trajectory.positions())?;

    tracing::debug!(
        samples = samples.len(),
        low_hz = band.low_hz,
        high_hz = band.high_hz,
        fps = trajectory.fps(),
        "Conditioned wrist trajectory"
    );

    Ok(ConditionedSignal::new(
        trajectory.fps(),
        samples,
        band.low_hz,
        band.high_hz,
    ))
}

/// Polynomial coefficients (highest power first) with the given roots.
fn expand_roots(roots: &[C64]) -> Vec<C64> {
    let mut coeffs = vec![C64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![C64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

/// Initial state giving a step response that starts in steady state.
fn steady_state(b: &[f64], a: &[f64]) -> TremorResult<Vec<f64>> {
    let order = a.len() - 1;
    if order == 0 {
        return Ok(Vec::new());
    }

    let mut system = DMatrix::<f64>::identity(order, order);
    for i in 0..order {
        system[(i, 0)] += a[i + 1];
        if i + 1 < order {
            system[(i, i + 1)] -= 1.0;
        }
    }
    let rhs = DVector::from_iterator(order, (0..order).map(|i| b[i + 1] - a[i + 1] * b[0]));

    let solution = system
        .lu()
        .solve(&rhs)
        .ok_or_else(|| TremorError::signal("filter initial conditions are singular"))?;
    Ok(solution.iter().copied().collect())
}

/// Extend both ends by point reflection about the end samples.
fn odd_extend(x: &[f64], padlen: usize) -> Vec<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * padlen);
    extended.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    extended.extend_from_slice(x);
    extended.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));
    extended
}
