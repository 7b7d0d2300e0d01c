//! Tremor Result Store
//!
//! Storage collaborator of the job runner. Persisting a result takes two
//! writes: the result document itself, then a link from the patient's
//! history to it. The [`ResultStore`] trait keeps them separate so the
//! caller can compensate with [`ResultStore::discard`] when the link fails.
//!
//! - [`FileStore`]: one JSON document per result and per patient history
//! - [`MemoryStore`]: in-process maps for tests and one-off analyses

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::*;
