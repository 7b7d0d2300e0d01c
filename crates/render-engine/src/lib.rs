//! Tremor Render Engine
//!
//! Renders the conditioned wrist signal of an analysis to a PNG line plot.
//! The file path becomes the `graph` reference of the stored result.
//!
//! ```text
//! ConditionedSignal ──▶ GraphWriter::render ──▶ RgbImage ──▶ signal_<stamp>_<id>.png
//! ```

pub mod graph;

pub use graph::*;
