//! Tremor Capture Engine
//!
//! Extracts the wrist trajectory from a pre-recorded clip:
//!
//! ```text
//! ┌──────────────┐  frames (BGR)  ┌─────────────────┐  wrist y  ┌─────────────────┐
//! │ VideoSource  │ ─────────────▶ │ LandmarkSession │ ────────▶ │ WristTrajectory │
//! │ (ffmpeg)     │   convert RGB  │ (helper / fake) │           │                 │
//! └──────────────┘                └─────────────────┘           └─────────────────┘
//! ```
//!
//! Decoding and detection sit behind traits so tests and alternative
//! backends can replace the external processes.

pub mod landmarks;
pub mod tracker;
pub mod video;

pub use landmarks::{HandLandmarks, Landmark, LandmarkModel, LandmarkSession, SidecarLandmarkModel};
pub use tracker::track_wrist;
pub use video::{FfmpegOpener, FfmpegVideo, Frame, PixelFormat, VideoOpener, VideoSource};
