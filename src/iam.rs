//! IAM role specs: trust policies, managed policy attachments, tags.
//!
//! A [`RoleSpec`] describes the desired state of one IAM role. The
//! trust policy is held structurally and rendered to the IAM JSON
//! document form on demand, so specs stay diffable while the engine
//! gets the exact wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::graph::ResourceKind;

/// IAM policy document version accepted by AWS.
pub const IAM_POLICY_VERSION: &str = "2012-10-17";

/// Action allowing a principal to assume a role.
pub const ACTION_ASSUME_ROLE: &str = "sts:AssumeRole";

/// EC2 service principal for node instance roles.
pub const SERVICE_PRINCIPAL_EC2: &str = "ec2.amazonaws.com";

/// Managed policy granting read-only ECR access.
pub const POLICY_ECR_READONLY: &str =
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly";

/// Managed policy required by the VPC CNI plugin.
pub const POLICY_EKS_CNI: &str = "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy";

/// Managed policy required by EKS worker nodes.
pub const POLICY_EKS_WORKER_NODE: &str = "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy";

/// The entity a trust policy grants access to.
///
/// Variants are explicit: an account or user ARN is not interchangeable
/// with a service principal, and each renders under a different key in
/// the IAM document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Principal {
    /// An AWS account, user, or role ARN.
    Aws(String),
    /// An AWS service principal such as `ec2.amazonaws.com`.
    Service(String),
}

impl Principal {
    fn validate(&self, resource: &str) -> Result<()> {
        match self {
            Principal::Aws(arn) => {
                if !arn.starts_with("arn:") {
                    return Err(Error::validation_field(
                        resource,
                        "principal",
                        format!("AWS principal must be an ARN, got '{}'", arn),
                    ));
                }
            }
            Principal::Service(svc) => {
                if svc.is_empty() {
                    return Err(Error::validation_field(
                        resource,
                        "principal",
                        "service principal must not be empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Who may assume a role and through which actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPolicy {
    /// The trusted principal.
    pub principal: Principal,
    /// Actions the principal is allowed, e.g. `sts:AssumeRole`.
    pub actions: Vec<String>,
}

impl TrustPolicy {
    /// Create a trust policy with explicit actions.
    pub fn new(principal: Principal, actions: Vec<String>) -> Self {
        Self { principal, actions }
    }

    /// The common case: allow the principal to assume the role.
    pub fn assume_role(principal: Principal) -> Self {
        Self::new(principal, vec![ACTION_ASSUME_ROLE.to_string()])
    }

    /// Render the policy as an IAM JSON document.
    pub fn document(&self) -> serde_json::Value {
        let principal = match &self.principal {
            Principal::Aws(arn) => json!({ "AWS": arn }),
            Principal::Service(svc) => json!({ "Service": svc }),
        };
        json!({
            "Version": IAM_POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": principal,
                "Action": self.actions,
            }],
        })
    }

    fn validate(&self, resource: &str) -> Result<()> {
        self.principal.validate(resource)?;
        if self.actions.is_empty() {
            return Err(Error::validation_field(
                resource,
                "actions",
                "trust policy must allow at least one action",
            ));
        }
        if self.actions.iter().any(|a| a.is_empty()) {
            return Err(Error::validation_field(
                resource,
                "actions",
                "actions must not be empty strings",
            ));
        }
        Ok(())
    }
}

/// A managed policy attached to a role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAttachment {
    /// Attachment name, unique within the role.
    pub name: String,
    /// ARN of the managed policy.
    pub policy_arn: String,
}

/// Desired state for one IAM role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Who may assume the role.
    pub trust: TrustPolicy,
    /// Managed policies to attach, applied in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<PolicyAttachment>,
    /// Resource tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl RoleSpec {
    /// Create a role spec with no attachments or tags.
    pub fn new(name: impl Into<String>, trust: TrustPolicy) -> Self {
        Self {
            name: name.into(),
            trust,
            attachments: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Attach a managed policy.
    pub fn with_attachment(
        mut self,
        name: impl Into<String>,
        policy_arn: impl Into<String>,
    ) -> Self {
        self.attachments.push(PolicyAttachment {
            name: name.into(),
            policy_arn: policy_arn.into(),
        });
        self
    }

    /// Add a resource tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::IamRole, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        self.trust.validate(&resource)?;
        for (i, attachment) in self.attachments.iter().enumerate() {
            if attachment.name.is_empty() {
                return Err(Error::validation_field(
                    &resource,
                    "attachments",
                    format!("attachment {} has an empty name", i),
                ));
            }
            if !attachment.policy_arn.starts_with("arn:") {
                return Err(Error::validation_field(
                    &resource,
                    "attachments",
                    format!(
                        "attachment '{}' policy must be an ARN, got '{}'",
                        attachment.name, attachment.policy_arn
                    ),
                ));
            }
            if self.attachments[..i].iter().any(|a| a.name == attachment.name) {
                return Err(Error::validation_field(
                    &resource,
                    "attachments",
                    format!("duplicate attachment name '{}'", attachment.name),
                ));
            }
            if self.attachments[..i]
                .iter()
                .any(|a| a.policy_arn == attachment.policy_arn)
            {
                return Err(Error::validation_field(
                    &resource,
                    "attachments",
                    format!("policy '{}' attached twice", attachment.policy_arn),
                ));
            }
        }
        Ok(())
    }
}
