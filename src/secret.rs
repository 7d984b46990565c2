//! Secret references and Kubernetes Secret specs.
//!
//! Secret material never enters a deployment plan. Sensitive entries
//! carry a [`SecretRef`], an opaque token naming a value in an external
//! configuration store; the engine applying the plan resolves tokens at
//! provisioning time. Plans therefore serialize, log, and diff safely.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::ResourceKind;

/// Default Kubernetes secret type.
pub const SECRET_TYPE_OPAQUE: &str = "Opaque";

/// An opaque handle to a secret value held in an external store.
///
/// The token identifies the value; it is not the value itself.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    /// Create a reference from a store token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The store token this reference names.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One data entry of a Kubernetes Secret.
///
/// `Literal` values are non-sensitive strings carried inline (for
/// example a hostname that happens to live next to credentials).
/// `Reference` values stay in the external store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretValue {
    /// Inline, non-sensitive value.
    Literal(String),
    /// Opaque reference resolved by the engine at apply time.
    #[serde(rename = "secretRef")]
    Reference(SecretRef),
}

impl SecretValue {
    /// Whether this entry is an external reference.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

/// Desired state for a Kubernetes Secret object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// Secret object name.
    pub name: String,
    /// Namespace the secret lives in.
    pub namespace: String,
    /// Kubernetes secret type.
    #[serde(rename = "type", default = "default_secret_type")]
    pub secret_type: String,
    /// Entries keyed by data key.
    pub data: BTreeMap<String, SecretValue>,
}

fn default_secret_type() -> String {
    SECRET_TYPE_OPAQUE.to_string()
}

impl SecretSpec {
    /// Create an empty Opaque secret spec.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            secret_type: default_secret_type(),
            data: BTreeMap::new(),
        }
    }

    /// Add an inline entry.
    pub fn with_literal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), SecretValue::Literal(value.into()));
        self
    }

    /// Add an entry resolved from the external store.
    pub fn with_reference(mut self, key: impl Into<String>, reference: SecretRef) -> Self {
        self.data.insert(key.into(), SecretValue::Reference(reference));
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::Secret, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.namespace.is_empty() {
            return Err(Error::validation_field(
                resource, "namespace", "must not be empty",
            ));
        }
        if self.data.is_empty() {
            return Err(Error::validation_field(
                resource, "data", "secret must carry at least one entry",
            ));
        }
        if self.data.keys().any(|k| k.is_empty()) {
            return Err(Error::validation_field(
                resource, "data", "entry keys must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> SecretSpec {
        SecretSpec::new("app-secrets", "apps")
            .with_reference("MONGO_PASSWORD", SecretRef::new("mongo_password"))
            .with_literal("MONGO_ENDPOINT", "mongodb.internal:27017")
    }

    /// Story: a plan holding credentials serializes without ever
    /// materializing the credential values, only their store tokens.
    #[test]
    fn story_secret_values_stay_opaque_through_serialization() {
        let spec = credentials();
        let yaml = serde_yaml::to_string(&spec).unwrap();
        assert!(yaml.contains("mongo_password"));
        assert!(yaml.contains("secretRef"));

        let back: SecretSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, spec);
        match &back.data["MONGO_PASSWORD"] {
            SecretValue::Reference(r) => assert_eq!(r.token(), "mongo_password"),
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_and_reference_shapes() {
        let spec = credentials();
        assert!(!spec.data["MONGO_ENDPOINT"].is_reference());
        assert!(spec.data["MONGO_PASSWORD"].is_reference());

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "Opaque");
        assert_eq!(json["data"]["MONGO_ENDPOINT"]["literal"], "mongodb.internal:27017");
        assert_eq!(json["data"]["MONGO_PASSWORD"]["secretRef"], "mongo_password");
    }

    #[test]
    fn test_validate_accepts_populated_spec() {
        assert!(credentials().validate().is_ok());
    }

    #[test]
    fn test_empty_data_rejected() {
        let err = SecretSpec::new("empty", "apps").validate().unwrap_err();
        assert_eq!(err.field(), Some("data"));
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(SecretSpec::new("", "apps")
            .with_literal("K", "v")
            .validate()
            .is_err());
        assert!(SecretSpec::new("s", "")
            .with_literal("K", "v")
            .validate()
            .is_err());
        assert!(SecretSpec::new("s", "apps")
            .with_literal("", "v")
            .validate()
            .is_err());
    }

    #[test]
    fn test_secret_type_defaults_on_deserialize() {
        let spec: SecretSpec = serde_yaml::from_str(
            "name: s\nnamespace: apps\ndata:\n  K:\n    literal: v\n",
        )
        .unwrap();
        assert_eq!(spec.secret_type, SECRET_TYPE_OPAQUE);
    }
}
