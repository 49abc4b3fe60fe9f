//! Registry configuration
//!
//! The worker identity comes from the membership service at startup, so it
//! has no default: a config must be built with one explicitly, read from
//! `RPC_PROFILER_WORKER_ID`, or loaded from a TOML file.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ProfilerError, Result};
use crate::id::WorkerId;

/// Environment variable holding the worker id
pub const ENV_WORKER_ID: &str = "RPC_PROFILER_WORKER_ID";

/// Environment variable holding the duplicate key policy
pub const ENV_DUPLICATE_KEYS: &str = "RPC_PROFILER_DUPLICATE_KEYS";

/// What `save_key` does when the id is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Replace the existing label
    #[default]
    Overwrite,
    /// Treat the second save as a contract violation
    Reject,
}

impl std::str::FromStr for DuplicateKeyPolicy {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(DuplicateKeyPolicy::Overwrite),
            "reject" => Ok(DuplicateKeyPolicy::Reject),
            other => Err(ProfilerError::config(format!(
                "unknown duplicate key policy {other:?} (expected \"overwrite\" or \"reject\")"
            ))),
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfilerConfig {
    /// Identity of this process within the RPC group
    pub worker_id: WorkerId,

    /// Behavior on a repeated `save_key` for the same id
    #[serde(default)]
    pub duplicate_key_policy: DuplicateKeyPolicy,
}

impl ProfilerConfig {
    /// Create a config with default settings for the given worker
    pub fn new(worker_id: impl Into<WorkerId>) -> Self {
        Self {
            worker_id: worker_id.into(),
            duplicate_key_policy: DuplicateKeyPolicy::default(),
        }
    }

    /// Create a new config builder
    pub fn builder(worker_id: impl Into<WorkerId>) -> ProfilerConfigBuilder {
        ProfilerConfigBuilder::new(worker_id)
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(ENV_WORKER_ID).ok_or_else(|| {
            ProfilerError::config(format!(
                "{ENV_WORKER_ID} is not set; worker identity must be known before the registry is built"
            ))
        })?;
        let worker_id: i64 = raw.trim().parse().map_err(|_| {
            ProfilerError::config(format!("{ENV_WORKER_ID} is not an integer: {raw:?}"))
        })?;

        let duplicate_key_policy = match lookup(ENV_DUPLICATE_KEYS) {
            Some(value) => value.parse()?,
            None => DuplicateKeyPolicy::default(),
        };

        Ok(Self {
            worker_id: WorkerId::try_from(worker_id)?,
            duplicate_key_policy,
        })
    }

    /// Parse config from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load config from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Builder for ProfilerConfig
pub struct ProfilerConfigBuilder {
    config: ProfilerConfig,
}

impl ProfilerConfigBuilder {
    /// Create a new builder with defaults
    pub fn new(worker_id: impl Into<WorkerId>) -> Self {
        Self {
            config: ProfilerConfig::new(worker_id),
        }
    }

    /// Set the duplicate key policy
    pub fn duplicate_key_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.config.duplicate_key_policy = policy;
        self
    }

    /// Reject duplicate saves instead of overwriting
    pub fn reject_duplicate_keys(self) -> Self {
        self.duplicate_key_policy(DuplicateKeyPolicy::Reject)
    }

    /// Build the configuration
    pub fn build(self) -> ProfilerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_policy_is_overwrite() {
        let config = ProfilerConfig::new(3u16);
        assert_eq!(config.worker_id, WorkerId::new(3));
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Overwrite);
    }

    #[test]
    fn test_config_builder() {
        let config = ProfilerConfig::builder(7u16).reject_duplicate_keys().build();
        assert_eq!(config.worker_id, WorkerId::new(7));
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Reject);
    }

    #[test]
    fn test_from_lookup() {
        let config = ProfilerConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_ID, " 12 "),
            (ENV_DUPLICATE_KEYS, "Reject"),
        ]))
        .unwrap();
        assert_eq!(config.worker_id, WorkerId::new(12));
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Reject);
    }

    #[test]
    fn test_from_lookup_requires_worker_id() {
        let err = ProfilerConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ProfilerError::Config(_)));
        assert!(err.to_string().contains(ENV_WORKER_ID));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = ProfilerConfig::from_lookup(lookup_from(&[(ENV_WORKER_ID, "abc")])).unwrap_err();
        assert!(matches!(err, ProfilerError::Config(_)));

        let err =
            ProfilerConfig::from_lookup(lookup_from(&[(ENV_WORKER_ID, "70000")])).unwrap_err();
        assert!(matches!(err, ProfilerError::WorkerIdOutOfRange(70000)));

        let err = ProfilerConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_ID, "1"),
            (ENV_DUPLICATE_KEYS, "ignore"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ignore"));
    }

    #[test]
    fn test_from_toml_str() {
        let config = ProfilerConfig::from_toml_str(
            r#"
            worker_id = 4
            duplicate_key_policy = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_id, WorkerId::new(4));
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Reject);

        let config = ProfilerConfig::from_toml_str("worker_id = 9").unwrap();
        assert_eq!(config.duplicate_key_policy, DuplicateKeyPolicy::Overwrite);
    }

    #[test]
    fn test_from_toml_str_rejects_out_of_range_worker() {
        let err = ProfilerConfig::from_toml_str("worker_id = 65536").unwrap_err();
        assert!(matches!(err, ProfilerError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_id = 2").unwrap();

        let config = ProfilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_id, WorkerId::new(2));

        let err = ProfilerConfig::from_file("/nonexistent/profiler.toml").unwrap_err();
        assert!(matches!(err, ProfilerError::Io(_)));
    }
}
