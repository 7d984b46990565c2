//! Configuration and secret-reference stores.
//!
//! A [`ConfigStore`] supplies the environment parameters a stack is
//! built from. Plaintext values come back as strings; secret lookups
//! come back as [`SecretRef`] tokens only. No store implementation in
//! this crate ever returns a secret value: resolution happens in the
//! external engine at apply time.
//!
//! Two stores are provided:
//! - [`MemoryConfig`] for tests and embedding callers
//! - [`EnvConfig`] reading `TRELLIS_*` environment variables

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::secret::SecretRef;

/// Prefix for environment-variable backed configuration.
pub const DEFAULT_ENV_PREFIX: &str = "TRELLIS_";

/// Key-value configuration with separate secret lookups.
pub trait ConfigStore {
    /// Look up a plaintext value.
    fn get(&self, key: &str) -> Option<String>;

    /// Look up a secret, returning its reference token.
    fn get_secret(&self, key: &str) -> Option<SecretRef>;

    /// Look up a plaintext value, failing when absent.
    fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| Error::missing_config(key))
    }

    /// Look up a secret reference, failing when absent.
    fn require_secret(&self, key: &str) -> Result<SecretRef> {
        self.get_secret(key)
            .ok_or_else(|| Error::missing_config(key))
    }
}

/// In-memory store. Secret keys are declared, never valued: the token
/// handed out is the key itself.
#[derive(Clone, Debug, Default)]
pub struct MemoryConfig {
    values: BTreeMap<String, String>,
    secrets: BTreeSet<String>,
}

impl MemoryConfig {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plaintext value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Declare that a secret exists under `key`.
    pub fn with_secret(mut self, key: impl Into<String>) -> Self {
        self.secrets.insert(key.into());
        self
    }
}

impl ConfigStore for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn get_secret(&self, key: &str) -> Option<SecretRef> {
        if self.secrets.contains(key) {
            Some(SecretRef::new(key))
        } else {
            None
        }
    }
}

/// Store backed by prefixed environment variables.
///
/// A key `admin_account_arn` resolves from `TRELLIS_ADMIN_ACCOUNT_ARN`.
/// Empty variables count as absent. Secret tokens name the variable
/// (`env:TRELLIS_KAFKA_API_KEY`) so the engine can resolve it later
/// without the value passing through the plan.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    /// Create a store with the [`DEFAULT_ENV_PREFIX`].
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Create a store with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        match std::env::var(self.var_name(key)) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn get_secret(&self, key: &str) -> Option<SecretRef> {
        let var = self.var_name(key);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Some(SecretRef::new(format!("env:{}", var))),
            _ => None,
        }
    }
}

/// Read an opaque configuration file, e.g. Kafka client properties
/// destined for a ConfigMap. The content is not parsed.
pub fn read_config_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
        path: path.display().to_string(),
        source,
    })
}
