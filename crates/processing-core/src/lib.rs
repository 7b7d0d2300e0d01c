//! Tremor Processing Core
//!
//! Turns a raw wrist trajectory into a tremor assessment:
//! - **Filter:** Age-adjusted zero-phase Butterworth band-pass conditioning
//! - **Spectrum:** Amplitude and dominant frequency of the conditioned signal
//! - **Features:** Versioned feature vector over the trailing signal window
//! - **Classifier:** Tremor category and heuristic severity grade
//! - **Interpretation:** Threshold rules producing text and alerts
//!
//! This crate is pure computation. The only I/O is loading an exported
//! classifier model from disk.

pub mod classifier;
pub mod features;
pub mod filter;
pub mod interpretation;
pub mod spectrum;

pub use classifier::{ForestClassifier, TremorClassifier};
pub use features::{extract_features, FeatureVector};
pub use filter::{condition, BandpassFilter, PassBand};
pub use interpretation::interpret;
pub use spectrum::{SpectralSummary, SpectrumConfig};
