//! Application-layer Kubernetes specs: namespaces, config maps, and
//! deployment-shaped workloads.
//!
//! Environment entries mirror the Kubernetes `EnvVar` shape: one entry
//! carries exactly one source (inline value, downward-API field, or a
//! key of a Secret object). Having all three as options keeps the
//! serialized form flat; `validate` enforces the exactly-one rule at
//! plan construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{validate_dns_label, ResourceKind};

/// Label key carrying the application name, used for selectors.
pub const LABEL_APP: &str = "app";

/// A key of a Kubernetes Secret object, referenced by an env entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the Secret object in the workload's namespace.
    pub secret: String,
    /// Data key within the secret.
    pub key: String,
}

/// One container environment variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvEntry {
    /// Variable name.
    pub name: String,
    /// Inline value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Downward-API field path, e.g. `status.podIP`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<String>,
    /// A key of a Secret object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

impl EnvEntry {
    /// An entry with an inline value.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            field_ref: None,
            secret_ref: None,
        }
    }

    /// An entry populated from the downward API.
    pub fn field_ref(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            field_ref: Some(path.into()),
            secret_ref: None,
        }
    }

    /// An entry populated from a key of a Secret object.
    pub fn from_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            field_ref: None,
            secret_ref: Some(SecretKeyRef {
                secret: secret.into(),
                key: key.into(),
            }),
        }
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation_field(
                resource,
                "env",
                "env entry name must not be empty",
            ));
        }
        let sources = usize::from(self.value.is_some())
            + usize::from(self.field_ref.is_some())
            + usize::from(self.secret_ref.is_some());
        if sources != 1 {
            return Err(Error::validation_field(
                resource,
                "env",
                format!(
                    "env entry '{}' must set exactly one of value, fieldRef, secretRef (got {})",
                    self.name, sources
                ),
            ));
        }
        Ok(())
    }
}

/// Container image pull policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    /// Pull on every pod start.
    Always,
    /// Pull only when the image is absent on the node.
    #[default]
    IfNotPresent,
    /// Never pull; the image must already be present.
    Never,
}

/// A ConfigMap mounted into the workload's containers as a volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMount {
    /// Name of the ConfigMap object in the workload's namespace.
    pub config_map: String,
    /// Absolute path the volume is mounted at.
    pub mount_path: String,
}

/// Desired state for one deployment-shaped workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Workload name.
    pub name: String,
    /// Namespace the workload runs in.
    pub namespace: String,
    /// Container image reference.
    pub image: String,
    /// Desired replica count.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Pod labels, also used as the selector.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Image pull policy.
    #[serde(default)]
    pub pull_policy: PullPolicy,
    /// Container environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,
    /// Secret objects whose entire data is injected as environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from_secrets: Vec<String>,
    /// ConfigMaps mounted as volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_mounts: Vec<ConfigMount>,
    /// Grace period before pods are killed on shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<u64>,
}

fn default_replicas() -> u32 {
    1
}

impl WorkloadSpec {
    /// Create a single-replica workload labeled `app: <name>`.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), name.clone());
        Self {
            name,
            namespace: namespace.into(),
            image: image.into(),
            replicas: default_replicas(),
            labels,
            pull_policy: PullPolicy::default(),
            env: Vec::new(),
            env_from_secrets: Vec::new(),
            config_mounts: Vec::new(),
            termination_grace_period_seconds: None,
        }
    }

    /// Add an environment entry.
    pub fn with_env(mut self, entry: EnvEntry) -> Self {
        self.env.push(entry);
        self
    }

    /// Inject a Secret object's data as environment.
    pub fn with_env_from_secret(mut self, secret: impl Into<String>) -> Self {
        self.env_from_secrets.push(secret.into());
        self
    }

    /// Mount a ConfigMap at an absolute path.
    pub fn with_config_mount(
        mut self,
        config_map: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Self {
        self.config_mounts.push(ConfigMount {
            config_map: config_map.into(),
            mount_path: mount_path.into(),
        });
        self
    }

    /// Set the replica count.
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the image pull policy.
    pub fn with_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_termination_grace(mut self, seconds: u64) -> Self {
        self.termination_grace_period_seconds = Some(seconds);
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::Workload, self.name);
        validate_dns_label(&resource, "name", &self.name)?;
        validate_dns_label(&resource, "namespace", &self.namespace)?;
        if self.image.is_empty() {
            return Err(Error::validation_field(resource, "image", "must not be empty"));
        }
        if self.replicas == 0 {
            return Err(Error::validation_field(
                resource,
                "replicas",
                "must be at least 1",
            ));
        }
        for (i, entry) in self.env.iter().enumerate() {
            entry.validate(&resource)?;
            if self.env[..i].iter().any(|e| e.name == entry.name) {
                return Err(Error::validation_field(
                    &resource,
                    "env",
                    format!("duplicate env entry '{}'", entry.name),
                ));
            }
        }
        for (i, secret) in self.env_from_secrets.iter().enumerate() {
            if secret.is_empty() {
                return Err(Error::validation_field(
                    &resource,
                    "envFromSecrets",
                    "secret name must not be empty",
                ));
            }
            if self.env_from_secrets[..i].iter().any(|s| s == secret) {
                return Err(Error::validation_field(
                    &resource,
                    "envFromSecrets",
                    format!("secret '{}' injected twice", secret),
                ));
            }
        }
        for (i, mount) in self.config_mounts.iter().enumerate() {
            if mount.config_map.is_empty() {
                return Err(Error::validation_field(
                    &resource,
                    "configMounts",
                    "configMap name must not be empty",
                ));
            }
            if !mount.mount_path.starts_with('/') {
                return Err(Error::validation_field(
                    &resource,
                    "configMounts",
                    format!("mount path '{}' must be absolute", mount.mount_path),
                ));
            }
            if self.config_mounts[..i]
                .iter()
                .any(|m| m.mount_path == mount.mount_path)
            {
                return Err(Error::validation_field(
                    &resource,
                    "configMounts",
                    format!("mount path '{}' used twice", mount.mount_path),
                ));
            }
        }
        Ok(())
    }
}

/// Desired state for a ConfigMap object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSpec {
    /// ConfigMap object name.
    pub name: String,
    /// Namespace the ConfigMap lives in.
    pub namespace: String,
    /// File entries keyed by file name.
    pub data: BTreeMap<String, String>,
}

impl ConfigMapSpec {
    /// Create an empty ConfigMap spec.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add a file entry.
    pub fn with_entry(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.data.insert(key.into(), content.into());
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::ConfigMap, self.name);
        validate_dns_label(&resource, "name", &self.name)?;
        validate_dns_label(&resource, "namespace", &self.namespace)?;
        if self.data.is_empty() {
            return Err(Error::validation_field(
                resource,
                "data",
                "config map must carry at least one entry",
            ));
        }
        if self.data.keys().any(|k| k.is_empty()) {
            return Err(Error::validation_field(
                resource,
                "data",
                "entry keys must not be empty",
            ));
        }
        Ok(())
    }
}

/// Desired state for a Namespace object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSpec {
    /// Namespace name.
    pub name: String,
}

impl NamespaceSpec {
    /// Create a namespace spec.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::Namespace, self.name);
        validate_dns_label(&resource, "name", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_workload() -> WorkloadSpec {
        WorkloadSpec::new("app", "apps", "public.ecr.aws/demo/streams-app:latest")
            .with_pull_policy(PullPolicy::Always)
            .with_env(EnvEntry::field_ref("POD_IP", "status.podIP"))
            .with_env_from_secret("app-secrets")
    }

    /// Story: the app deployment injects its pod IP through the
    /// downward API and its credentials from a secret, and the entry
    /// shapes survive serialization.
    #[test]
    fn story_app_workload_env_sources() {
        let workload = app_workload();
        workload.validate().unwrap();

        let json = serde_json::to_value(&workload).unwrap();
        assert_eq!(json["env"][0]["fieldRef"], "status.podIP");
        assert_eq!(json["envFromSecrets"][0], "app-secrets");
        assert_eq!(json["labels"]["app"], "app");
    }

    #[test]
    fn test_env_entry_with_two_sources_rejected() {
        let mut entry = EnvEntry::literal("ARGS", "--generator");
        entry.field_ref = Some("status.podIP".to_string());
        let workload = app_workload().with_env(entry);
        let err = workload.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one"));
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn test_env_entry_with_no_source_rejected() {
        let entry = EnvEntry {
            name: "EMPTY".to_string(),
            value: None,
            field_ref: None,
            secret_ref: None,
        };
        let err = app_workload().with_env(entry).validate().unwrap_err();
        assert!(err.to_string().contains("got 0"));
    }

    #[test]
    fn test_each_single_source_accepted() {
        let workload = app_workload()
            .with_env(EnvEntry::literal("ARGS", "--generator"))
            .with_env(EnvEntry::from_secret("API_KEY", "app-secrets", "API_KEY"));
        workload.validate().unwrap();
    }

    #[test]
    fn test_duplicate_env_name_rejected() {
        let workload = app_workload()
            .with_env(EnvEntry::literal("ARGS", "a"))
            .with_env(EnvEntry::literal("ARGS", "b"));
        let err = workload.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate env entry 'ARGS'"));
    }

    #[test]
    fn test_zero_replicas_rejected() {
        let err = app_workload().with_replicas(0).validate().unwrap_err();
        assert_eq!(err.field(), Some("replicas"));
    }

    #[test]
    fn test_non_dns_name_rejected() {
        let workload = WorkloadSpec::new("My App!", "apps", "img");
        let err = workload.validate().unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_relative_mount_path_rejected() {
        let workload = app_workload().with_config_mount("bootstrap-config", "etc/config");
        let err = workload.validate().unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn test_duplicate_mount_path_rejected() {
        let workload = app_workload()
            .with_config_mount("a", "/etc/config")
            .with_config_mount("b", "/etc/config");
        let err = workload.validate().unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn test_same_secret_injected_twice_rejected() {
        let workload = app_workload().with_env_from_secret("app-secrets");
        let err = workload.validate().unwrap_err();
        assert!(err.to_string().contains("injected twice"));
    }

    #[test]
    fn test_pull_policy_defaults_on_deserialize() {
        let yaml = "name: app\nnamespace: apps\nimage: img\n";
        let workload: WorkloadSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workload.pull_policy, PullPolicy::IfNotPresent);
        assert_eq!(workload.replicas, 1);
    }

    #[test]
    fn test_config_map_requires_data() {
        let err = ConfigMapSpec::new("bootstrap-config", "apps")
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("data"));

        ConfigMapSpec::new("bootstrap-config", "apps")
            .with_entry("bootstrap.properties", "bootstrap.servers=broker:9092")
            .validate()
            .unwrap();
    }

    #[test]
    fn test_namespace_name_validation() {
        NamespaceSpec::new("apps").validate().unwrap();
        assert!(NamespaceSpec::new("").validate().is_err());
        assert!(NamespaceSpec::new("Apps").validate().is_err());
        assert!(NamespaceSpec::new("-apps").validate().is_err());
    }

    #[test]
    fn test_workload_serde_round_trip() {
        let workload = app_workload()
            .with_config_mount("bootstrap-config", "/etc/config")
            .with_termination_grace(10);
        let yaml = serde_yaml::to_string(&workload).unwrap();
        let back: WorkloadSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, workload);
    }
}
