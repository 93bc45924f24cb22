//! # ace-core
//!
//! Capability seams and the capture stage of the ACE learning pipeline.
//!
//! This crate provides:
//! - The capability and store traits every other crate plugs into
//! - The `Generator`, which wraps an agent and records an `ExecutionTrace`
//!   for every request, running it a second time when that is safe
//! - Trace-id minting, working-tree snapshots, and outbox delivery
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ace_core::{CaptureRequest, Generator, traits::{AgentExecutor, TraceStore}};
//! ```

pub mod clock;
pub mod generator;
pub mod outbox;
pub mod snapshot;
pub mod trace_id;
pub mod traits;

pub use generator::{CaptureOutcome, CapturePolicy, CaptureRequest, Generator};
pub use outbox::{dispatch_all, LoggingDispatcher};
pub use snapshot::{diff_snapshots, VcsSnapshot};
