//! Error types for the RPC profiler registry
//!
//! Two kinds of failure exist here. Contract violations are bugs in a
//! collaborator (looking up an erased id, double-setting the current key,
//! reading an unset key). Everything else is configuration or loading
//! trouble at startup.

use thiserror::Error;

use crate::id::ProfilingId;

/// Main error type for registry operations
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// No label is registered under the id
    #[error("No profiling key registered for id {0}")]
    KeyNotFound(ProfilingId),

    /// A label is already registered under the id and duplicates are rejected
    #[error("Profiling key already registered for id {0}")]
    DuplicateKey(ProfilingId),

    /// The current key slot is occupied and must be cleared first
    #[error("Cannot set current profiling key while {current:?} is still set")]
    CurrentKeyAlreadySet { current: String },

    /// The current key slot is empty
    #[error("Current profiling key must be set before it is read")]
    CurrentKeyNotSet,

    /// Worker id does not fit in the bits above the local counter
    #[error("Worker id {0} is out of range (expected 0..=65535)")]
    WorkerIdOutOfRange(i128),

    /// Text that does not parse as a profiling id
    #[error("Invalid profiling id: {0:?}")]
    InvalidId(String),

    /// The process-wide registry was installed twice
    #[error("Process-wide profiler registry is already installed")]
    AlreadyInstalled,

    /// The process-wide registry was read before installation
    #[error("Process-wide profiler registry has not been installed")]
    NotInstalled,

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file access error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProfilerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ProfilerError::Config(msg.into())
    }

    /// Check if this error signals misuse by a caller rather than bad input
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ProfilerError::KeyNotFound(_)
                | ProfilerError::DuplicateKey(_)
                | ProfilerError::CurrentKeyAlreadySet { .. }
                | ProfilerError::CurrentKeyNotSet
                | ProfilerError::NotInstalled
        )
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Abort on a broken usage contract. Continuing would leave a collaborator
/// in an inconsistent state.
pub(crate) fn contract_violation(err: ProfilerError) -> ! {
    tracing::error!(error = %err, "Profiler usage contract violated");
    panic!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProfilerError::KeyNotFound(ProfilingId::from_u64(7));
        assert_eq!(err.to_string(), "No profiling key registered for id 0:7");

        let err = ProfilerError::CurrentKeyAlreadySet {
            current: "aten::add".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot set current profiling key while \"aten::add\" is still set"
        );
    }

    #[test]
    fn test_is_contract_violation() {
        assert!(ProfilerError::CurrentKeyNotSet.is_contract_violation());
        assert!(ProfilerError::KeyNotFound(ProfilingId::from_u64(1)).is_contract_violation());
        assert!(!ProfilerError::config("missing").is_contract_violation());
        assert!(!ProfilerError::WorkerIdOutOfRange(-1).is_contract_violation());
    }
}
