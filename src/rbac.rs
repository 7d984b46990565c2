//! Kubernetes RBAC specs: cluster roles and role bindings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{validate_dns_label, ResourceKind};

/// API group RBAC role references live in.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// One RBAC rule: which verbs apply to which resources in which groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// API groups the rule covers. `""` is the core group, `*` all.
    pub api_groups: Vec<String>,
    /// Resource types the rule covers.
    pub resources: Vec<String>,
    /// Verbs granted on those resources.
    pub verbs: Vec<String>,
}

impl PolicyRule {
    /// Create a rule.
    pub fn new(api_groups: Vec<String>, resources: Vec<String>, verbs: Vec<String>) -> Self {
        Self {
            api_groups,
            resources,
            verbs,
        }
    }

    /// The rule granting every verb on every resource in every group.
    pub fn wildcard() -> Self {
        Self::new(
            vec!["*".to_string()],
            vec!["*".to_string()],
            vec!["*".to_string()],
        )
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.api_groups.is_empty() {
            return Err(Error::validation_field(
                resource,
                "rules",
                "rule must name at least one API group",
            ));
        }
        if self.resources.is_empty() {
            return Err(Error::validation_field(
                resource,
                "rules",
                "rule must name at least one resource",
            ));
        }
        if self.verbs.is_empty() {
            return Err(Error::validation_field(
                resource,
                "rules",
                "rule must grant at least one verb",
            ));
        }
        Ok(())
    }
}

/// Desired state for a ClusterRole object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleSpec {
    /// ClusterRole object name.
    pub name: String,
    /// Rules granted by the role.
    pub rules: Vec<PolicyRule>,
}

impl ClusterRoleSpec {
    /// Create a role with no rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::ClusterRole, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.rules.is_empty() {
            return Err(Error::validation_field(
                resource,
                "rules",
                "role must grant at least one rule",
            ));
        }
        for rule in &self.rules {
            rule.validate(&resource)?;
        }
        Ok(())
    }
}

/// Kind of identity a binding grants a role to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    /// A user identity, as authenticated by the cluster.
    User,
    /// A group identity.
    Group,
    /// A service account object.
    ServiceAccount,
}

/// One identity a binding applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Identity kind.
    pub kind: SubjectKind,
    /// Identity name.
    pub name: String,
    /// Namespace, required for service accounts only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Subject {
    /// A user subject.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
            namespace: None,
        }
    }

    /// A group subject.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
            namespace: None,
        }
    }

    /// A service account subject.
    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation_field(
                resource,
                "subjects",
                "subject name must not be empty",
            ));
        }
        match self.kind {
            SubjectKind::ServiceAccount => {
                if self.namespace.is_none() {
                    return Err(Error::validation_field(
                        resource,
                        "subjects",
                        format!("service account '{}' requires a namespace", self.name),
                    ));
                }
            }
            SubjectKind::User | SubjectKind::Group => {
                if self.namespace.is_some() {
                    return Err(Error::validation_field(
                        resource,
                        "subjects",
                        format!("subject '{}' must not set a namespace", self.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Whether a binding grants across the cluster or within one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingScope {
    /// A ClusterRoleBinding.
    Cluster,
    /// A RoleBinding in the named namespace.
    Namespaced(String),
}

/// Desired state for a binding of a ClusterRole to subjects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBindingSpec {
    /// Binding object name.
    pub name: String,
    /// Name of the ClusterRole being bound.
    pub role: String,
    /// Identities the role is granted to.
    pub subjects: Vec<Subject>,
    /// Binding scope.
    pub scope: BindingScope,
}

impl RoleBindingSpec {
    /// Create a cluster-scoped binding with no subjects.
    pub fn cluster_scoped(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            subjects: Vec::new(),
            scope: BindingScope::Cluster,
        }
    }

    /// Create a namespaced binding with no subjects.
    pub fn namespaced(
        name: impl Into<String>,
        role: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            subjects: Vec::new(),
            scope: BindingScope::Namespaced(namespace.into()),
        }
    }

    /// Add a subject.
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::ClusterRoleBinding, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.role.is_empty() {
            return Err(Error::validation_field(
                resource,
                "role",
                "binding must name a role",
            ));
        }
        if self.subjects.is_empty() {
            return Err(Error::validation_field(
                resource,
                "subjects",
                "binding must grant to at least one subject",
            ));
        }
        for (i, subject) in self.subjects.iter().enumerate() {
            subject.validate(&resource)?;
            if self.subjects[..i].iter().any(|s| s == subject) {
                return Err(Error::validation_field(
                    &resource,
                    "subjects",
                    format!("duplicate subject '{}'", subject.name),
                ));
            }
        }
        if let BindingScope::Namespaced(namespace) = &self.scope {
            validate_dns_label(&resource, "scope", namespace)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_role() -> ClusterRoleSpec {
        ClusterRoleSpec::new("demo-admin").with_rule(PolicyRule::wildcard())
    }

    fn admin_binding() -> RoleBindingSpec {
        RoleBindingSpec::cluster_scoped("demo-admin-binding", "demo-admin")
            .with_subject(Subject::user("demo:admin"))
    }

    /// Story: the cluster admin role grants everything and is bound to
    /// the mapped admin user cluster-wide.
    #[test]
    fn story_admin_role_and_binding_validate() {
        admin_role().validate().unwrap();
        let binding = admin_binding();
        binding.validate().unwrap();
        assert_eq!(binding.scope, BindingScope::Cluster);
    }

    #[test]
    fn test_role_without_rules_rejected() {
        let err = ClusterRoleSpec::new("empty").validate().unwrap_err();
        assert_eq!(err.field(), Some("rules"));
    }

    #[test]
    fn test_rule_without_verbs_rejected() {
        let role = ClusterRoleSpec::new("reader").with_rule(PolicyRule::new(
            vec!["".to_string()],
            vec!["pods".to_string()],
            vec![],
        ));
        let err = role.validate().unwrap_err();
        assert!(err.to_string().contains("at least one verb"));
    }

    #[test]
    fn test_binding_without_subjects_rejected() {
        let err = RoleBindingSpec::cluster_scoped("b", "demo-admin")
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("subjects"));
    }

    #[test]
    fn test_service_account_requires_namespace() {
        let mut subject = Subject::service_account("apps", "deployer");
        subject.namespace = None;
        let err = admin_binding().with_subject(subject).validate().unwrap_err();
        assert!(err.to_string().contains("requires a namespace"));
    }

    #[test]
    fn test_user_with_namespace_rejected() {
        let mut subject = Subject::user("demo:other");
        subject.namespace = Some("apps".to_string());
        let err = admin_binding().with_subject(subject).validate().unwrap_err();
        assert!(err.to_string().contains("must not set a namespace"));
    }

    #[test]
    fn test_duplicate_subject_rejected() {
        let err = admin_binding()
            .with_subject(Subject::user("demo:admin"))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate subject"));
    }

    #[test]
    fn test_namespaced_scope_serde_shape() {
        let binding = RoleBindingSpec::namespaced("deployer-binding", "demo-admin", "apps")
            .with_subject(Subject::service_account("apps", "deployer"));
        binding.validate().unwrap();

        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["scope"]["namespaced"], "apps");

        let cluster = serde_json::to_value(&admin_binding()).unwrap();
        assert_eq!(cluster["scope"], "cluster");
    }

    #[test]
    fn test_subject_kind_serializes_as_k8s_value() {
        let json = serde_json::to_value(Subject::user("u")).unwrap();
        assert_eq!(json["kind"], "User");
        let json = serde_json::to_value(Subject::service_account("apps", "sa")).unwrap();
        assert_eq!(json["kind"], "ServiceAccount");
    }

    #[test]
    fn test_binding_serde_round_trip() {
        let binding = admin_binding();
        let yaml = serde_yaml::to_string(&binding).unwrap();
        let back: RoleBindingSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, binding);
    }
}
