//! Error taxonomy for the ACE learning pipeline.
//!
//! All fallible operations return `AceResult<T>`. The variants form a small
//! closed set so callers can match on the category of failure instead of
//! inspecting message text.

use thiserror::Error;

/// The unified error type for every ACE crate.
#[derive(Debug, Error)]
pub enum AceError {
    /// A requested trace, playbook, or delta file does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// Input was rejected before any state was touched.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A capability cannot be used at all, typically a missing credential.
    ///
    /// The reason carries setup guidance. Never retried.
    #[error("{capability} unavailable: {reason}")]
    CapabilityUnavailable { capability: String, reason: String },

    /// A capability was reachable but the call itself failed.
    #[error("{capability} call failed: {reason}")]
    Capability { capability: String, reason: String },

    /// Reading or writing a durable store failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A configuration file or value is malformed.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Coarse category of an `AceError`, for pattern matching at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    CapabilityUnavailable,
    Capability,
    Storage,
    Config,
}

impl AceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AceError::NotFound { .. } => ErrorKind::NotFound,
            AceError::Validation { .. } => ErrorKind::Validation,
            AceError::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            AceError::Capability { .. } => ErrorKind::Capability,
            AceError::Storage { .. } => ErrorKind::Storage,
            AceError::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        AceError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        AceError::Validation {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        AceError::Storage {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the ACE crates.
pub type AceResult<T> = Result<T, AceError>;
