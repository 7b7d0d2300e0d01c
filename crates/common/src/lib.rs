//! Tremor Common Utilities
//!
//! Shared infrastructure for all tremor crates:
//! - Error types and result aliases
//! - Frame clock and attempt deadlines
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
