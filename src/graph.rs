//! The desired-state resource graph.
//!
//! A [`ResourceGraph`] is the complete set of resource specifications
//! for one deployment, each node carrying the ids of the resources
//! that must exist before it. The graph is plain data: building it
//! performs no provider calls, and [`ResourceGraph::resolve_dependency_order`]
//! is a pure topological sort. The external reconciliation engine
//! consumes the ordered nodes and diffs them against live state.
//!
//! Ordering is deterministic: ties between nodes whose dependencies
//! are all satisfied are broken by declaration order, so the same
//! graph always resolves to the same sequence.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterSpec, ProviderContextSpec};
use crate::error::{Error, Result, UNKNOWN_RESOURCE};
use crate::iam::RoleSpec;
use crate::network::NetworkSpec;
use crate::rbac::{ClusterRoleSpec, RoleBindingSpec};
use crate::secret::SecretSpec;
use crate::workload::{ConfigMapSpec, NamespaceSpec, WorkloadSpec};

// ============================================================================
// Attribute names
// ============================================================================

/// ARN of an IAM role, known once the role exists.
pub const ATTR_ARN: &str = "arn";

/// Id of a provisioned VPC.
pub const ATTR_VPC_ID: &str = "vpcId";

/// Public IPs of a network's NAT gateways.
pub const ATTR_NAT_PUBLIC_IPS: &str = "natPublicIps";

/// Physical name of a provisioned cluster.
pub const ATTR_NAME: &str = "name";

/// Kubeconfig of a provisioned cluster. Sensitive.
pub const ATTR_KUBECONFIG: &str = "kubeconfig";

// ============================================================================
// Identity
// ============================================================================

/// The kind of a resource in the graph, one per spec type.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResourceKind {
    /// A VPC and its subnet layout.
    Network,
    /// An IAM role.
    IamRole,
    /// An EKS cluster.
    Cluster,
    /// A Kubernetes provider context bound to a cluster kubeconfig.
    ProviderContext,
    /// A Kubernetes namespace.
    Namespace,
    /// A Kubernetes ClusterRole.
    ClusterRole,
    /// A binding of a ClusterRole to subjects.
    ClusterRoleBinding,
    /// A Kubernetes ConfigMap.
    ConfigMap,
    /// A Kubernetes Secret.
    Secret,
    /// A deployment-shaped workload.
    Workload,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Network => "Network",
            ResourceKind::IamRole => "IamRole",
            ResourceKind::Cluster => "Cluster",
            ResourceKind::ProviderContext => "ProviderContext",
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Workload => "Workload",
        };
        f.write_str(s)
    }
}

/// Unique identity of a resource within one graph: kind plus name.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name, unique within the kind.
    pub name: String,
}

impl ResourceId {
    /// Create a resource id.
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A provisioning-time output of a resource, referenced by name.
///
/// Values like a VPC id or a role ARN do not exist until the engine
/// has applied the plan, so specs and exports refer to them as
/// (resource, attribute) pairs instead of carrying values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRef {
    /// The resource whose output is referenced.
    pub resource: ResourceId,
    /// Attribute name, e.g. [`ATTR_ARN`].
    pub attribute: String,
}

impl AttributeRef {
    /// Create an attribute reference.
    pub fn new(resource: ResourceId, attribute: impl Into<String>) -> Self {
        Self {
            resource,
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Validate a Kubernetes object name as an RFC 1123 DNS label.
pub(crate) fn validate_dns_label(resource: &str, field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation_field(resource, field, "must not be empty"));
    }
    if value.len() > 63 {
        return Err(Error::validation_field(
            resource,
            field,
            "must be at most 63 characters",
        ));
    }
    let bytes = value.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let body_ok = bytes.iter().all(|&b| alnum(b) || b == b'-');
    if !body_ok || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err(Error::validation_field(
            resource,
            field,
            format!(
                "'{}' is not a DNS label (lowercase alphanumeric and '-', must start and end alphanumeric)",
                value
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// Nodes
// ============================================================================

/// A resource specification, tagged by kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResourceSpec {
    /// VPC spec.
    Network(NetworkSpec),
    /// IAM role spec.
    IamRole(RoleSpec),
    /// EKS cluster spec.
    Cluster(ClusterSpec),
    /// Provider context spec.
    ProviderContext(ProviderContextSpec),
    /// Namespace spec.
    Namespace(NamespaceSpec),
    /// ClusterRole spec.
    ClusterRole(ClusterRoleSpec),
    /// ClusterRoleBinding spec.
    ClusterRoleBinding(RoleBindingSpec),
    /// ConfigMap spec.
    ConfigMap(ConfigMapSpec),
    /// Secret spec.
    Secret(SecretSpec),
    /// Workload spec.
    Workload(WorkloadSpec),
}

impl ResourceSpec {
    /// The kind this spec declares.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::IamRole(_) => ResourceKind::IamRole,
            ResourceSpec::Cluster(_) => ResourceKind::Cluster,
            ResourceSpec::ProviderContext(_) => ResourceKind::ProviderContext,
            ResourceSpec::Namespace(_) => ResourceKind::Namespace,
            ResourceSpec::ClusterRole(_) => ResourceKind::ClusterRole,
            ResourceSpec::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            ResourceSpec::ConfigMap(_) => ResourceKind::ConfigMap,
            ResourceSpec::Secret(_) => ResourceKind::Secret,
            ResourceSpec::Workload(_) => ResourceKind::Workload,
        }
    }

    /// The declared resource name.
    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Network(s) => &s.name,
            ResourceSpec::IamRole(s) => &s.name,
            ResourceSpec::Cluster(s) => &s.name,
            ResourceSpec::ProviderContext(s) => &s.name,
            ResourceSpec::Namespace(s) => &s.name,
            ResourceSpec::ClusterRole(s) => &s.name,
            ResourceSpec::ClusterRoleBinding(s) => &s.name,
            ResourceSpec::ConfigMap(s) => &s.name,
            ResourceSpec::Secret(s) => &s.name,
            ResourceSpec::Workload(s) => &s.name,
        }
    }

    /// The identity this spec occupies in a graph.
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name())
    }

    /// Validate the inner spec.
    pub fn validate(&self) -> Result<()> {
        match self {
            ResourceSpec::Network(s) => s.validate(),
            ResourceSpec::IamRole(s) => s.validate(),
            ResourceSpec::Cluster(s) => s.validate(),
            ResourceSpec::ProviderContext(s) => s.validate(),
            ResourceSpec::Namespace(s) => s.validate(),
            ResourceSpec::ClusterRole(s) => s.validate(),
            ResourceSpec::ClusterRoleBinding(s) => s.validate(),
            ResourceSpec::ConfigMap(s) => s.validate(),
            ResourceSpec::Secret(s) => s.validate(),
            ResourceSpec::Workload(s) => s.validate(),
        }
    }
}

/// One node of the graph: a spec plus the ids it depends on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// The resource specification.
    pub spec: ResourceSpec,
    /// Resources that must exist before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceId>,
}

impl ResourceNode {
    /// Create a node.
    pub fn new(spec: ResourceSpec, depends_on: Vec<ResourceId>) -> Self {
        Self { spec, depends_on }
    }

    /// The node's identity, derived from its spec.
    pub fn id(&self) -> ResourceId {
        self.spec.id()
    }
}

// ============================================================================
// Graph
// ============================================================================

/// The desired-state graph for one deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGraph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
}

impl ResourceGraph {
    /// Create a graph from nodes in declaration order.
    pub fn new(nodes: Vec<ResourceNode>) -> Self {
        Self { nodes }
    }

    /// The nodes in declaration order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| &n.id() == id)
    }

    /// Resolve the order resources must be applied in.
    ///
    /// Kahn's algorithm over the dependency edges. Among nodes whose
    /// dependencies are all satisfied, the earliest-declared is emitted
    /// first, so the result is deterministic for identical input.
    /// Fails when an id is declared twice, an edge points at a resource
    /// not in the graph, or the edges form a cycle.
    pub fn resolve_dependency_order(&self) -> Result<Vec<&ResourceNode>> {
        let mut index: BTreeMap<ResourceId, usize> = BTreeMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.id(), i).is_some() {
                return Err(Error::validation(
                    node.id().to_string(),
                    "declared more than once in the graph",
                ));
            }
        }

        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let Some(&j) = index.get(dep) else {
                    return Err(Error::validation(
                        node.id().to_string(),
                        format!("depends on {} which is not in the graph", dep),
                    ));
                };
                dependents[j].push(i);
                indegree[i] += 1;
            }
        }

        // Ready set keyed by declaration index: ties resolve to the
        // earliest-declared node.
        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut ordered: Vec<&ResourceNode> = Vec::with_capacity(n);
        while let Some(i) = ready.iter().next().copied() {
            ready.remove(&i);
            ordered.push(&self.nodes[i]);
            for &dependent in &dependents[i] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if ordered.len() != n {
            let stuck = self
                .nodes
                .iter()
                .enumerate()
                .find(|(i, _)| indegree[*i] > 0)
                .map(|(_, node)| node.id().to_string())
                .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string());
            return Err(Error::validation(
                stuck,
                "dependency cycle detected in resource graph",
            ));
        }
        Ok(ordered)
    }

    /// Re-validate every spec and the graph structure.
    ///
    /// Used when a graph arrives from outside the builder, e.g. parsed
    /// from YAML.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            node.spec.validate()?;
        }
        self.resolve_dependency_order().map(|_| ())
    }

    /// Serialize the graph to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a graph from YAML and re-validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let graph: Self = serde_yaml::from_str(yaml)?;
        graph.validate()?;
        Ok(graph)
    }
}
