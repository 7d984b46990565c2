//! Explicit construction of deployment plans.
//!
//! [`PlanBuilder`] replaces ambient resource registration: every
//! resource is added through a typed operation that validates the spec
//! and its references, and returns the [`ResourceId`] later operations
//! use to point at it. Construction fails fast: the first invalid spec
//! or dangling reference aborts with a validation error and no partial
//! plan escapes.
//!
//! Builder operations only assemble data. No provider call is made and
//! no I/O happens here.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::cluster::{ClusterSpec, ProviderContextSpec};
use crate::error::{Error, Result};
use crate::export::Export;
use crate::graph::{AttributeRef, ResourceGraph, ResourceId, ResourceKind, ResourceNode, ResourceSpec};
use crate::iam::RoleSpec;
use crate::network::NetworkSpec;
use crate::plan::DeploymentPlan;
use crate::rbac::{BindingScope, ClusterRoleSpec, RoleBindingSpec};
use crate::secret::SecretSpec;
use crate::workload::{ConfigMapSpec, NamespaceSpec, WorkloadSpec};

/// Assembles a validated [`DeploymentPlan`].
#[derive(Debug, Default)]
pub struct PlanBuilder {
    nodes: Vec<ResourceNode>,
    exports: Vec<Export>,
}

impl PlanBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, id: &ResourceId) -> bool {
        self.nodes.iter().any(|n| &n.id() == id)
    }

    fn find(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| &n.id() == id)
    }

    /// Namespace a registered namespaced object lives in. For Namespace
    /// nodes this is the namespace's own name.
    fn namespace_of(&self, id: &ResourceId) -> Option<&str> {
        match &self.find(id)?.spec {
            ResourceSpec::Namespace(s) => Some(&s.name),
            ResourceSpec::ConfigMap(s) => Some(&s.namespace),
            ResourceSpec::Secret(s) => Some(&s.namespace),
            ResourceSpec::Workload(s) => Some(&s.namespace),
            _ => None,
        }
    }

    fn require(&self, referrer: &str, id: &ResourceId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::validation(
                referrer,
                format!("references {} which is not in the plan", id),
            ))
        }
    }

    fn require_kind(&self, referrer: &str, id: &ResourceId, kind: ResourceKind) -> Result<()> {
        if id.kind != kind {
            return Err(Error::validation(
                referrer,
                format!("expected a {} reference, got {}", kind, id),
            ));
        }
        self.require(referrer, id)
    }

    fn register(&mut self, spec: ResourceSpec, deps: Vec<ResourceId>) -> Result<ResourceId> {
        let id = spec.id();
        if self.contains(&id) {
            return Err(Error::validation(
                id.to_string(),
                "already declared in the plan",
            ));
        }
        let mut seen: BTreeSet<ResourceId> = BTreeSet::new();
        let deps: Vec<ResourceId> = deps.into_iter().filter(|d| seen.insert(d.clone())).collect();
        debug!(resource = %id, dependencies = deps.len(), "registered resource");
        self.nodes.push(ResourceNode::new(spec, deps));
        Ok(id)
    }

    // ========================================================================
    // Infrastructure resources
    // ========================================================================

    /// Add a VPC. Roots the graph; depends on nothing.
    pub fn build_network(&mut self, spec: NetworkSpec) -> Result<ResourceId> {
        spec.validate()?;
        self.register(ResourceSpec::Network(spec), Vec::new())
    }

    /// Add an IAM role with its trust policy and attachments.
    pub fn build_trust_role(&mut self, spec: RoleSpec) -> Result<ResourceId> {
        spec.validate()?;
        self.register(ResourceSpec::IamRole(spec), Vec::new())
    }

    /// Add an EKS cluster. The referenced network, node role, and every
    /// mapped IAM role must already be in the plan.
    pub fn build_cluster(&mut self, spec: ClusterSpec) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::Cluster, &spec.name).to_string();
        self.require(&referrer, &spec.network)?;
        self.require(&referrer, &spec.node_role)?;
        let mut deps = vec![spec.network.clone(), spec.node_role.clone()];
        for mapping in &spec.role_mappings {
            self.require(&referrer, &mapping.role_arn.resource)?;
            deps.push(mapping.role_arn.resource.clone());
        }
        self.register(ResourceSpec::Cluster(spec), deps)
    }

    /// Add a provider context bound to a registered cluster.
    pub fn build_provider_context(&mut self, spec: ProviderContextSpec) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::ProviderContext, &spec.name).to_string();
        self.require(&referrer, &spec.cluster)?;
        let deps = vec![spec.cluster.clone()];
        self.register(ResourceSpec::ProviderContext(spec), deps)
    }

    // ========================================================================
    // Kubernetes objects
    // ========================================================================

    /// Add a namespace, applied through the given provider context.
    pub fn build_namespace(
        &mut self,
        spec: NamespaceSpec,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::Namespace, &spec.name).to_string();
        self.require_kind(&referrer, provider, ResourceKind::ProviderContext)?;
        self.register(ResourceSpec::Namespace(spec), vec![provider.clone()])
    }

    /// Add a ClusterRole, applied through the given provider context.
    pub fn build_cluster_role(
        &mut self,
        spec: ClusterRoleSpec,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::ClusterRole, &spec.name).to_string();
        self.require_kind(&referrer, provider, ResourceKind::ProviderContext)?;
        self.register(ResourceSpec::ClusterRole(spec), vec![provider.clone()])
    }

    /// Add a binding of a registered ClusterRole.
    pub fn build_cluster_role_binding(
        &mut self,
        spec: RoleBindingSpec,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::ClusterRoleBinding, &spec.name).to_string();
        self.require_kind(&referrer, provider, ResourceKind::ProviderContext)?;
        let role_id = ResourceId::new(ResourceKind::ClusterRole, &spec.role);
        self.require(&referrer, &role_id)?;
        let mut deps = vec![provider.clone(), role_id];
        if let BindingScope::Namespaced(namespace) = &spec.scope {
            let ns_id = ResourceId::new(ResourceKind::Namespace, namespace);
            self.require(&referrer, &ns_id)?;
            deps.push(ns_id);
        }
        self.register(ResourceSpec::ClusterRoleBinding(spec), deps)
    }

    /// Add a ConfigMap inside a registered namespace.
    pub fn build_config_map(
        &mut self,
        spec: ConfigMapSpec,
        namespace: &ResourceId,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::ConfigMap, &spec.name).to_string();
        self.require_namespaced(&referrer, &spec.namespace, namespace, provider)?;
        self.register(
            ResourceSpec::ConfigMap(spec),
            vec![namespace.clone(), provider.clone()],
        )
    }

    /// Add a Secret inside a registered namespace. Entries carry
    /// literals or reference tokens; no secret value is stored.
    pub fn build_secret(
        &mut self,
        spec: SecretSpec,
        namespace: &ResourceId,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::Secret, &spec.name).to_string();
        self.require_namespaced(&referrer, &spec.namespace, namespace, provider)?;
        self.register(
            ResourceSpec::Secret(spec),
            vec![namespace.clone(), provider.clone()],
        )
    }

    /// Add a workload. Every Secret its environment references and
    /// every ConfigMap it mounts must already be in the plan, in the
    /// same namespace.
    pub fn build_workload(
        &mut self,
        spec: WorkloadSpec,
        namespace: &ResourceId,
        provider: &ResourceId,
    ) -> Result<ResourceId> {
        spec.validate()?;
        let referrer = ResourceId::new(ResourceKind::Workload, &spec.name).to_string();
        self.require_namespaced(&referrer, &spec.namespace, namespace, provider)?;
        let mut deps = vec![namespace.clone(), provider.clone()];

        let mut secret_names: Vec<&str> = Vec::new();
        for entry in &spec.env {
            if let Some(secret_ref) = &entry.secret_ref {
                if !secret_names.contains(&secret_ref.secret.as_str()) {
                    secret_names.push(&secret_ref.secret);
                }
            }
        }
        for name in &spec.env_from_secrets {
            if !secret_names.contains(&name.as_str()) {
                secret_names.push(name);
            }
        }
        for name in secret_names {
            let secret_id = ResourceId::new(ResourceKind::Secret, name);
            self.require(&referrer, &secret_id)?;
            self.require_same_namespace(&referrer, &secret_id, &spec.namespace)?;
            deps.push(secret_id);
        }

        for mount in &spec.config_mounts {
            let cm_id = ResourceId::new(ResourceKind::ConfigMap, &mount.config_map);
            self.require(&referrer, &cm_id)?;
            self.require_same_namespace(&referrer, &cm_id, &spec.namespace)?;
            deps.push(cm_id);
        }

        self.register(ResourceSpec::Workload(spec), deps)
    }

    /// Shared checks for namespaced objects: the namespace handle is a
    /// registered Namespace whose name matches the spec's namespace
    /// field, and the provider handle is a registered provider context.
    fn require_namespaced(
        &self,
        referrer: &str,
        spec_namespace: &str,
        namespace: &ResourceId,
        provider: &ResourceId,
    ) -> Result<()> {
        self.require_kind(referrer, namespace, ResourceKind::Namespace)?;
        self.require_kind(referrer, provider, ResourceKind::ProviderContext)?;
        if namespace.name != spec_namespace {
            return Err(Error::validation(
                referrer,
                format!(
                    "declared in namespace '{}' but attached to {}",
                    spec_namespace, namespace
                ),
            ));
        }
        Ok(())
    }

    fn require_same_namespace(
        &self,
        referrer: &str,
        id: &ResourceId,
        namespace: &str,
    ) -> Result<()> {
        match self.namespace_of(id) {
            Some(ns) if ns == namespace => Ok(()),
            Some(ns) => Err(Error::validation(
                referrer,
                format!(
                    "references {} in namespace '{}', expected '{}'",
                    id, ns, namespace
                ),
            )),
            None => Err(Error::validation(
                referrer,
                format!("references {} which is not namespaced", id),
            )),
        }
    }

    // ========================================================================
    // Exports
    // ========================================================================

    /// Export a plan-time literal.
    pub fn export_literal(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.push_export(Export::literal(name, value))
    }

    /// Export an attribute of a registered resource.
    pub fn export_attribute(
        &mut self,
        name: impl Into<String>,
        resource: &ResourceId,
        attribute: impl Into<String>,
    ) -> Result<()> {
        self.push_export(Export::attribute(
            name,
            AttributeRef::new(resource.clone(), attribute),
        ))
    }

    /// Export a sensitive attribute of a registered resource.
    pub fn export_secret_attribute(
        &mut self,
        name: impl Into<String>,
        resource: &ResourceId,
        attribute: impl Into<String>,
    ) -> Result<()> {
        self.push_export(Export::secret_attribute(
            name,
            AttributeRef::new(resource.clone(), attribute),
        ))
    }

    /// Export a command template over registered resource attributes.
    pub fn export_command(
        &mut self,
        name: impl Into<String>,
        template: impl Into<String>,
        arguments: Vec<AttributeRef>,
    ) -> Result<()> {
        self.push_export(Export::command(name, template, arguments))
    }

    fn push_export(&mut self, export: Export) -> Result<()> {
        export.validate()?;
        let referrer = format!("export/{}", export.name);
        for attr in export.attribute_refs() {
            self.require(&referrer, &attr.resource)?;
        }
        if self.exports.iter().any(|e| e.name == export.name) {
            return Err(Error::validation(referrer, "export already declared"));
        }
        debug!(export = %export.name, "registered export");
        self.exports.push(export);
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Finish the plan. Re-resolves the dependency order as a final
    /// structural check before handing the plan over.
    pub fn finish(self) -> Result<DeploymentPlan> {
        let graph = ResourceGraph::new(self.nodes);
        graph.resolve_dependency_order()?;
        info!(
            resources = graph.len(),
            exports = self.exports.len(),
            "deployment plan assembled"
        );
        Ok(DeploymentPlan::new(graph, self.exports))
    }
}
