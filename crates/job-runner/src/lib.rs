//! Tremor Job Runner
//!
//! Wraps the analysis pipeline in an asynchronous, retrying,
//! progress-reporting unit of work:
//!
//! ```text
//!  submit ──▶ queue ──▶ worker ──▶ attempt 1 ──▶ analyze ──▶ persist ──▶ SUCCESS
//!                                     │ retryable error
//!                                     ▼
//!                              wait retry_delay ──▶ attempt 2 ... ──▶ FAILURE
//! ```
//!
//! - **Pipeline:** tracking, conditioning, spectrum, features, classification,
//!   interpretation, and graph rendering for one clip
//! - **Runner:** worker pool, retry loop, time limits, and the job registry

pub mod pipeline;
pub mod registry;
pub mod runner;

pub use pipeline::{persist, persist_unless_abandoned, AnalysisPipeline, Analyzer};
pub use registry::JobRegistry;
pub use runner::{AttemptOutcome, JobRunner, RunnerConfig};
