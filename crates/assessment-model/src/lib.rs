//! Tremor Assessment Model
//!
//! Defines the core data contracts of the tremor pipeline:
//! - **Trajectory:** Per-frame wrist positions and their conditioned form
//! - **Assessment:** The persisted analysis result and its wire format
//! - **Job:** Submission requests, job states, and progress reporting
//!
//! Wrist positions are normalized image coordinates in `[0.0, 1.0]` as
//! reported by the landmark model, so amplitudes are resolution independent.

pub mod assessment;
pub mod job;
pub mod trajectory;

pub use assessment::*;
pub use job::*;
pub use trajectory::*;
