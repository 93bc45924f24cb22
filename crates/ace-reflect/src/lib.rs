//! # ace-reflect
//!
//! The reflection stage of the ACE learning pipeline.
//!
//! This crate provides:
//! - `Reflector`, which sends a batch of traces to an `InsightExtractor`
//!   and writes the resulting deltas to the delta store
//! - Strict-then-lenient parsing of extractor responses (`parse`)
//! - Default priority and confidence rules (`defaults`)
//! - Deltas derived from user satisfaction scores (`satisfaction`)
//! - Satisfaction propagation down delegation chains

pub mod defaults;
pub mod parse;
pub mod prompt;
pub mod reflector;
pub mod satisfaction;

pub use reflector::{Propagation, ReflectionOutcome, Reflector, ReflectorSettings, TraceSelector};
