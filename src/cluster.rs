//! EKS cluster specs and the provider context derived from them.
//!
//! A [`ClusterSpec`] references the network it lives in and the IAM
//! role its nodes run under by resource id, not by value. ARNs and
//! other provisioning-time outputs are never copied into the spec;
//! where one is needed (aws-auth role mappings) the spec carries an
//! [`AttributeRef`] that the engine resolves at apply time.

use serde::{Deserialize, Serialize};

use crate::cidr::CidrBlock;
use crate::error::{Error, Result};
use crate::graph::{AttributeRef, ResourceId, ResourceKind, ATTR_ARN};

/// Node group sizing and instance selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSizing {
    /// EC2 instance type for worker nodes.
    pub instance_type: String,
    /// Minimum node count.
    pub min_size: u32,
    /// Node count the group scales to at creation.
    pub desired_capacity: u32,
    /// Maximum node count.
    pub max_size: u32,
}

impl NodeSizing {
    /// Create a sizing spec.
    pub fn new(instance_type: impl Into<String>, min_size: u32, desired_capacity: u32, max_size: u32) -> Self {
        Self {
            instance_type: instance_type.into(),
            min_size,
            desired_capacity,
            max_size,
        }
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.instance_type.is_empty() {
            return Err(Error::validation_field(
                resource,
                "instanceType",
                "must not be empty",
            ));
        }
        if self.min_size > self.desired_capacity {
            return Err(Error::validation_field(
                resource,
                "minSize",
                format!(
                    "minSize {} exceeds desiredCapacity {}",
                    self.min_size, self.desired_capacity
                ),
            ));
        }
        if self.desired_capacity > self.max_size {
            return Err(Error::validation_field(
                resource,
                "desiredCapacity",
                format!(
                    "desiredCapacity {} exceeds maxSize {}",
                    self.desired_capacity, self.max_size
                ),
            ));
        }
        Ok(())
    }
}

/// Reachability of the cluster API endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAccess {
    /// Reachable from inside the VPC.
    pub private: bool,
    /// Reachable from the internet.
    pub public: bool,
}

impl Default for EndpointAccess {
    fn default() -> Self {
        Self {
            private: true,
            public: true,
        }
    }
}

impl EndpointAccess {
    fn validate(&self, resource: &str) -> Result<()> {
        if !self.private && !self.public {
            return Err(Error::validation_field(
                resource,
                "endpoint",
                "endpoint must be reachable privately, publicly, or both",
            ));
        }
        Ok(())
    }
}

/// An aws-auth entry mapping an IAM role onto Kubernetes RBAC identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapping {
    /// Kubernetes groups granted to the role.
    pub groups: Vec<String>,
    /// Kubernetes username the role authenticates as.
    pub username: String,
    /// The mapped role's ARN, resolved at apply time.
    pub role_arn: AttributeRef,
}

impl RoleMapping {
    /// Map an IAM role (by plan id) to a Kubernetes username and groups.
    pub fn new(role: ResourceId, groups: Vec<String>, username: impl Into<String>) -> Self {
        Self {
            groups,
            username: username.into(),
            role_arn: AttributeRef::new(role, ATTR_ARN),
        }
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::validation_field(
                resource,
                "roleMappings",
                format!("mapping for '{}' grants no groups", self.username),
            ));
        }
        if self.username.is_empty() {
            return Err(Error::validation_field(
                resource,
                "roleMappings",
                "mapping username must not be empty",
            ));
        }
        if self.role_arn.resource.kind != ResourceKind::IamRole {
            return Err(Error::validation_field(
                resource,
                "roleMappings",
                format!(
                    "mapping for '{}' must reference an IamRole, got {}",
                    self.username, self.role_arn.resource
                ),
            ));
        }
        Ok(())
    }
}

/// Desired state for one EKS cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster name.
    pub name: String,
    /// The network the cluster is placed in.
    pub network: ResourceId,
    /// IAM role worker node instances run under.
    pub node_role: ResourceId,
    /// Worker node sizing.
    pub sizing: NodeSizing,
    /// API endpoint reachability.
    #[serde(default)]
    pub endpoint: EndpointAccess,
    /// Service network address range.
    pub service_cidr: CidrBlock,
    /// Whether worker nodes get public IP addresses.
    #[serde(default)]
    pub node_public_ip: bool,
    /// Whether to create an OIDC provider for IRSA.
    #[serde(default = "default_true")]
    pub oidc_provider: bool,
    /// Whether to run workloads on Fargate instead of managed nodes.
    #[serde(default)]
    pub fargate: bool,
    /// aws-auth role mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_mappings: Vec<RoleMapping>,
}

fn default_true() -> bool {
    true
}

impl ClusterSpec {
    /// Create a cluster spec with defaults: endpoint reachable both
    /// privately and publicly, OIDC provider on, nodes without public
    /// IPs, managed nodes rather than Fargate.
    pub fn new(
        name: impl Into<String>,
        network: ResourceId,
        node_role: ResourceId,
        sizing: NodeSizing,
        service_cidr: CidrBlock,
    ) -> Self {
        Self {
            name: name.into(),
            network,
            node_role,
            sizing,
            endpoint: EndpointAccess::default(),
            service_cidr,
            node_public_ip: false,
            oidc_provider: true,
            fargate: false,
            role_mappings: Vec::new(),
        }
    }

    /// Add an aws-auth role mapping.
    pub fn with_role_mapping(mut self, mapping: RoleMapping) -> Self {
        self.role_mappings.push(mapping);
        self
    }

    /// Set endpoint reachability.
    pub fn with_endpoint(mut self, endpoint: EndpointAccess) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::Cluster, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.network.kind != ResourceKind::Network {
            return Err(Error::validation_field(
                &resource,
                "network",
                format!("must reference a Network, got {}", self.network),
            ));
        }
        if self.node_role.kind != ResourceKind::IamRole {
            return Err(Error::validation_field(
                &resource,
                "nodeRole",
                format!("must reference an IamRole, got {}", self.node_role),
            ));
        }
        self.sizing.validate(&resource)?;
        self.endpoint.validate(&resource)?;
        for (i, mapping) in self.role_mappings.iter().enumerate() {
            mapping.validate(&resource)?;
            if self.role_mappings[..i]
                .iter()
                .any(|m| m.username == mapping.username)
            {
                return Err(Error::validation_field(
                    &resource,
                    "roleMappings",
                    format!("duplicate mapping username '{}'", mapping.username),
                ));
            }
        }
        Ok(())
    }
}

/// A Kubernetes provider context bound to a cluster's kubeconfig.
///
/// Namespaced objects are applied through a provider context rather
/// than whatever cluster the operator's own credentials point at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderContextSpec {
    /// Context name.
    pub name: String,
    /// The cluster whose kubeconfig this context uses.
    pub cluster: ResourceId,
}

impl ProviderContextSpec {
    /// Create a provider context for a cluster.
    pub fn new(name: impl Into<String>, cluster: ResourceId) -> Self {
        Self {
            name: name.into(),
            cluster,
        }
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::ProviderContext, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.cluster.kind != ResourceKind::Cluster {
            return Err(Error::validation_field(
                resource,
                "cluster",
                format!("must reference a Cluster, got {}", self.cluster),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn network_id() -> ResourceId {
        ResourceId::new(ResourceKind::Network, "demo-vpc")
    }

    fn node_role_id() -> ResourceId {
        ResourceId::new(ResourceKind::IamRole, "demo-node-role")
    }

    fn admin_role_id() -> ResourceId {
        ResourceId::new(ResourceKind::IamRole, "demo-cluster-admin")
    }

    fn demo_cluster() -> ClusterSpec {
        ClusterSpec::new(
            "demo-cluster",
            network_id(),
            node_role_id(),
            NodeSizing::new("m5.large", 1, 2, 3),
            "172.20.0.0/16".parse().unwrap(),
        )
        .with_role_mapping(RoleMapping::new(
            admin_role_id(),
            vec!["demo:admins".to_string()],
            "demo:admin",
        ))
    }

    /// Story: a production-shaped cluster spec with an admin role
    /// mapping validates, and the mapping carries a reference to the
    /// role's ARN rather than a copied value.
    #[test]
    fn story_cluster_with_admin_mapping_validates() {
        let cluster = demo_cluster();
        cluster.validate().unwrap();
        let mapping = &cluster.role_mappings[0];
        assert_eq!(mapping.role_arn.resource, admin_role_id());
        assert_eq!(mapping.role_arn.attribute, ATTR_ARN);
    }

    #[rstest]
    #[case(1, 2, 3, true)]
    #[case(2, 2, 2, true)]
    #[case(0, 0, 0, true)]
    #[case(3, 2, 3, false)]
    #[case(1, 4, 3, false)]
    fn test_sizing_bounds(#[case] min: u32, #[case] desired: u32, #[case] max: u32, #[case] ok: bool) {
        let mut cluster = demo_cluster();
        cluster.sizing = NodeSizing::new("m5.large", min, desired, max);
        assert_eq!(cluster.validate().is_ok(), ok);
    }

    #[test]
    fn test_sizing_error_names_field() {
        let mut cluster = demo_cluster();
        cluster.sizing.min_size = 5;
        let err = cluster.validate().unwrap_err();
        assert_eq!(err.field(), Some("minSize"));
        assert_eq!(err.resource(), Some("Cluster/demo-cluster"));
    }

    #[test]
    fn test_unreachable_endpoint_rejected() {
        let cluster = demo_cluster().with_endpoint(EndpointAccess {
            private: false,
            public: false,
        });
        let err = cluster.validate().unwrap_err();
        assert_eq!(err.field(), Some("endpoint"));
    }

    #[test]
    fn test_wrong_kind_references_rejected() {
        let mut cluster = demo_cluster();
        cluster.network = node_role_id();
        assert_eq!(cluster.validate().unwrap_err().field(), Some("network"));

        let mut cluster = demo_cluster();
        cluster.node_role = network_id();
        assert_eq!(cluster.validate().unwrap_err().field(), Some("nodeRole"));
    }

    #[test]
    fn test_mapping_must_reference_role() {
        let cluster = demo_cluster().with_role_mapping(RoleMapping::new(
            network_id(),
            vec!["demo:viewers".to_string()],
            "demo:viewer",
        ));
        let err = cluster.validate().unwrap_err();
        assert!(err.to_string().contains("must reference an IamRole"));
    }

    #[test]
    fn test_mapping_without_groups_rejected() {
        let cluster = demo_cluster()
            .with_role_mapping(RoleMapping::new(admin_role_id(), vec![], "demo:other"));
        let err = cluster.validate().unwrap_err();
        assert!(err.to_string().contains("grants no groups"));
    }

    #[test]
    fn test_duplicate_mapping_username_rejected() {
        let cluster = demo_cluster().with_role_mapping(RoleMapping::new(
            admin_role_id(),
            vec!["demo:other".to_string()],
            "demo:admin",
        ));
        let err = cluster.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate mapping username"));
    }

    #[test]
    fn test_cluster_serde_round_trip() {
        let cluster = demo_cluster();
        let yaml = serde_yaml::to_string(&cluster).unwrap();
        let back: ClusterSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, cluster);
    }

    #[test]
    fn test_provider_context_requires_cluster() {
        let ctx = ProviderContextSpec::new("demo-provider", network_id());
        assert!(ctx.validate().is_err());

        let ctx = ProviderContextSpec::new(
            "demo-provider",
            ResourceId::new(ResourceKind::Cluster, "demo-cluster"),
        );
        ctx.validate().unwrap();
    }
}
