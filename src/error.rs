//! Error types for trellis planning and serialization.
//!
//! Plan construction fails fast: the first invalid spec or dangling
//! reference aborts the build and no partial graph is returned. All
//! constructor and builder failures surface as [`Error::Validation`]
//! carrying the offending resource and, where known, the field.

use thiserror::Error;

/// Result alias used throughout trellis.
pub type Result<T> = std::result::Result<T, Error>;

/// Resource label used for validation errors raised outside the context
/// of a named resource.
pub const UNKNOWN_RESOURCE: &str = "unknown";

/// Main error type for trellis operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A spec failed validation, or a builder operation referenced a
    /// resource that is not registered in the plan.
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource the error relates to, `Kind/name` where known.
        resource: String,
        /// Spec field that failed validation, when attributable.
        field: Option<String>,
        /// Description of the failure.
        message: String,
    },

    /// A required configuration key was absent from the store.
    #[error("missing required config key: {key}")]
    MissingConfig {
        /// The key that was requested.
        key: String,
    },

    /// A configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        /// Path that was being read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization or deserialization error.
    #[error("yaml serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization or deserialization error.
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error scoped to a resource.
    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: None,
            message: message.into(),
        }
    }

    /// Create a validation error attributed to a specific spec field.
    pub fn validation_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create a missing-config error for a required key.
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// Whether this error came from spec or reference validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The resource a validation error relates to, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Validation { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// The spec field a validation error is attributed to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
