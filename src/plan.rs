//! The assembled deployment plan.
//!
//! A [`DeploymentPlan`] pairs the resource graph with the stack's
//! exports. It is the unit that crosses process boundaries: serialized
//! to YAML or JSON for review, diffed between revisions, and handed to
//! the reconciliation engine. Parsing re-runs full validation, so a
//! plan obtained from [`DeploymentPlan::from_yaml`] upholds the same
//! guarantees as one built through the builder.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::Export;
use crate::graph::{ResourceGraph, ResourceNode};

/// A validated resource graph plus the exports published alongside it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    graph: ResourceGraph,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exports: Vec<Export>,
}

impl DeploymentPlan {
    /// Pair a graph with its exports. Callers outside the builder
    /// should run [`DeploymentPlan::validate`] afterwards.
    pub fn new(graph: ResourceGraph, exports: Vec<Export>) -> Self {
        Self { graph, exports }
    }

    /// The resource graph.
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Exports in declaration order.
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    /// Look up an export by name.
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// The order resources must be applied in.
    pub fn apply_order(&self) -> Result<Vec<&ResourceNode>> {
        self.graph.resolve_dependency_order()
    }

    /// Re-validate the whole plan: every spec, the graph structure,
    /// every export, and every export's attribute references.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        for (i, export) in self.exports.iter().enumerate() {
            export.validate()?;
            let referrer = format!("export/{}", export.name);
            if self.exports[..i].iter().any(|e| e.name == export.name) {
                return Err(Error::validation(referrer, "export already declared"));
            }
            for attr in export.attribute_refs() {
                if self.graph.get(&attr.resource).is_none() {
                    return Err(Error::validation(
                        referrer,
                        format!("references {} which is not in the graph", attr.resource),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Serialize the plan to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a plan from YAML and re-validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let plan: Self = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Serialize the plan to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a plan from JSON and re-validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttributeRef, ResourceId, ResourceKind, ResourceSpec};
    use crate::graph::{ATTR_KUBECONFIG, ATTR_VPC_ID};
    use crate::network::{NetworkSpec, SubnetKind};
    use crate::workload::NamespaceSpec;

    fn network_node() -> ResourceNode {
        ResourceNode::new(
            ResourceSpec::Network(
                NetworkSpec::new("demo-vpc", "10.0.0.0/16".parse().unwrap())
                    .with_subnet(SubnetKind::Public, 19, "frontend")
                    .with_subnet(SubnetKind::Private, 18, "backend"),
            ),
            Vec::new(),
        )
    }

    fn demo_plan() -> DeploymentPlan {
        let vpc = ResourceId::new(ResourceKind::Network, "demo-vpc");
        DeploymentPlan::new(
            ResourceGraph::new(vec![network_node()]),
            vec![
                Export::attribute("vpcId", AttributeRef::new(vpc, ATTR_VPC_ID)),
                Export::literal("stack", "demo"),
            ],
        )
    }

    #[test]
    fn test_export_lookup() {
        let plan = demo_plan();
        assert!(plan.export("vpcId").is_some());
        assert!(plan.export("kubeconfig").is_none());
    }

    /// Story: a plan round trips through YAML with exports intact,
    /// secret flags included, and comes back pre-validated.
    #[test]
    fn story_plan_round_trips_through_yaml() {
        let vpc = ResourceId::new(ResourceKind::Network, "demo-vpc");
        let plan = DeploymentPlan::new(
            ResourceGraph::new(vec![network_node()]),
            vec![Export::secret_attribute(
                "kubeconfig",
                AttributeRef::new(vpc, ATTR_KUBECONFIG),
            )],
        );
        let yaml = plan.to_yaml().unwrap();
        let back = DeploymentPlan::from_yaml(&yaml).unwrap();
        assert_eq!(back, plan);
        assert!(back.export("kubeconfig").unwrap().secret);
    }

    #[test]
    fn test_json_round_trip() {
        let plan = demo_plan();
        let json = plan.to_json().unwrap();
        let back = DeploymentPlan::from_json(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_validate_rejects_dangling_export() {
        let ghost = ResourceId::new(ResourceKind::Cluster, "ghost");
        let plan = DeploymentPlan::new(
            ResourceGraph::new(vec![network_node()]),
            vec![Export::secret_attribute(
                "kubeconfig",
                AttributeRef::new(ghost, ATTR_KUBECONFIG),
            )],
        );
        let err = plan.validate().unwrap_err();
        assert_eq!(err.resource(), Some("export/kubeconfig"));
        assert!(err.to_string().contains("not in the graph"));
    }

    #[test]
    fn test_validate_rejects_duplicate_export_names() {
        let plan = DeploymentPlan::new(
            ResourceGraph::new(vec![network_node()]),
            vec![
                Export::literal("stack", "demo"),
                Export::literal("stack", "demo-again"),
            ],
        );
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("already declared"));
    }

    #[test]
    fn test_apply_order_orders_namespace_after_nothing() {
        let plan = DeploymentPlan::new(
            ResourceGraph::new(vec![
                network_node(),
                ResourceNode::new(ResourceSpec::Namespace(NamespaceSpec::new("apps")), vec![]),
            ]),
            Vec::new(),
        );
        let order = plan.apply_order().unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].id().to_string(), "Network/demo-vpc");
    }
}
