//! # ace-curate
//!
//! The curation stage of the ACE learning pipeline.
//!
//! This crate provides:
//! - `Curator`, which folds pending delta files into an agent's playbook
//! - Cosine similarity over embeddings (`similarity`) and an exact-text
//!   embedding cache (`cache`)
//! - Two-pass pruning (`prune`) and health metrics (`health`)

pub mod cache;
pub mod curator;
pub mod health;
pub mod prune;
pub mod similarity;

pub use cache::EmbeddingCache;
pub use curator::{merge_into, CurationOutcome, Curator, CuratorSettings, DeltaDisposition};
pub use health::compute_health;
pub use prune::{prune, PruneSettings, PruneSummary};
pub use similarity::cosine_similarity;
