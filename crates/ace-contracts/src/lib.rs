//! # ace-contracts
//!
//! Shared types, schemas, and the error taxonomy for the ACE learning
//! pipeline (capture → reflection → curation).
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, invariant checks, and error types.

pub mod agent;
pub mod delta;
pub mod error;
pub mod events;
pub mod playbook;
pub mod trace;
