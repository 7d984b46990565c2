//! Trellis - desired-state resource graph builder for EKS cluster deployments
//!
//! Trellis turns a small set of environment parameters into a complete,
//! validated deployment plan: typed resource specifications connected by
//! "must exist before" edges, plus the values the stack exports after
//! apply. An external IaC engine consumes the plan, diffs it against
//! live state, and performs the provider calls; trellis itself makes no
//! provider calls and performs no I/O beyond reading configuration.
//!
//! # Design
//!
//! - Construction is explicit: [`PlanBuilder`] operations validate each
//!   spec and its references and return the [`ResourceId`] handles later
//!   operations use. There is no ambient registry, and construction
//!   fails fast with no partial plan.
//! - Plans are plain data: [`ResourceGraph::resolve_dependency_order`]
//!   is a pure topological sort, deterministic with a declaration-order
//!   tie-break.
//! - Secret values never enter a plan: sensitive entries carry opaque
//!   [`SecretRef`] tokens resolved by the engine at apply time.
//!
//! # Modules
//!
//! - [`builder`] - explicit plan construction
//! - [`cidr`] - validated IPv4 CIDR blocks
//! - [`cluster`] - EKS cluster and provider context specs
//! - [`config`] - configuration and secret store boundary
//! - [`error`] - error types
//! - [`export`] - stack outputs
//! - [`graph`] - the resource graph and dependency ordering
//! - [`iam`] - IAM trust policies and roles
//! - [`network`] - VPC and subnet specs
//! - [`plan`] - the assembled deployment plan
//! - [`rbac`] - Kubernetes RBAC specs
//! - [`secret`] - opaque secret references and Secret specs
//! - [`stack`] - the parameterized EKS stack
//! - [`workload`] - namespaces, config maps, and workloads

#![deny(missing_docs)]

pub mod builder;
pub mod cidr;
pub mod cluster;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod iam;
pub mod network;
pub mod plan;
pub mod rbac;
pub mod secret;
pub mod stack;
pub mod workload;

pub use builder::PlanBuilder;
pub use error::{Error, Result};
pub use export::{Export, ExportValue};
pub use graph::{
    AttributeRef, ResourceGraph, ResourceId, ResourceKind, ResourceNode, ResourceSpec,
};
pub use plan::DeploymentPlan;
pub use secret::SecretRef;
pub use stack::{build_stack, StackParams};
