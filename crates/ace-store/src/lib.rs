//! # ace-store
//!
//! Durable stores for the ACE learning pipeline.
//!
//! - `FsTraceStore`: day-partitioned trace documents with markdown twins
//! - `InMemoryTraceStore`: process-local trace store
//! - `FsDeltaStore`: reflection output awaiting curation
//! - `FsPlaybookStore`: one playbook per agent plus curation reports
//!
//! Every file write goes through `atomic::write_atomic`.

pub mod atomic;
pub mod delta_store;
pub mod memory;
pub mod playbook_store;
pub mod render;
pub mod trace_store;

pub use delta_store::FsDeltaStore;
pub use memory::InMemoryTraceStore;
pub use playbook_store::FsPlaybookStore;
pub use trace_store::FsTraceStore;
