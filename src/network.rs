//! VPC network specs: address space, subnet layout, NAT strategy.
//!
//! A [`NetworkSpec`] describes one VPC. Subnets are declared as
//! (kind, mask, name) templates; the engine stamps them out per
//! availability zone, so the spec stays independent of the region's
//! actual zone names.

use serde::{Deserialize, Serialize};

use crate::cidr::CidrBlock;
use crate::error::{Error, Result};
use crate::graph::ResourceKind;

/// Longest subnet prefix AWS accepts.
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// Routing class of a subnet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubnetKind {
    /// Routable from the internet through an internet gateway.
    Public,
    /// Egress only, through a NAT gateway.
    Private,
}

impl std::fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnetKind::Public => f.write_str("public"),
            SubnetKind::Private => f.write_str("private"),
        }
    }
}

/// How many NAT gateways the VPC provisions for private egress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NatStrategy {
    /// One NAT gateway shared by all zones. Cheaper, single point of
    /// failure for private egress.
    #[default]
    Single,
    /// One NAT gateway per availability zone.
    OnePerAz,
}

/// A subnet template, stamped out once per availability zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Routing class.
    pub kind: SubnetKind,
    /// Prefix length of each stamped subnet.
    pub mask: u8,
    /// Template name, unique within the VPC.
    pub name: String,
}

/// Desired state for one VPC and its subnet layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// VPC name.
    pub name: String,
    /// Address space of the VPC.
    pub cidr: CidrBlock,
    /// Number of availability zones to spread subnets across.
    pub az_count: u32,
    /// Subnet templates.
    pub subnets: Vec<SubnetSpec>,
    /// NAT gateway provisioning strategy.
    #[serde(default)]
    pub nat: NatStrategy,
    /// Whether instances get DNS hostnames. Required for EKS nodes to
    /// register with the cluster.
    #[serde(default = "default_true")]
    pub enable_dns_hostnames: bool,
}

fn default_true() -> bool {
    true
}

impl NetworkSpec {
    /// Create a network spec with defaults: two zones, a single NAT
    /// gateway, DNS hostnames enabled, no subnets.
    pub fn new(name: impl Into<String>, cidr: CidrBlock) -> Self {
        Self {
            name: name.into(),
            cidr,
            az_count: 2,
            subnets: Vec::new(),
            nat: NatStrategy::default(),
            enable_dns_hostnames: true,
        }
    }

    /// Add a subnet template.
    pub fn with_subnet(mut self, kind: SubnetKind, mask: u8, name: impl Into<String>) -> Self {
        self.subnets.push(SubnetSpec {
            kind,
            mask,
            name: name.into(),
        });
        self
    }

    /// Set the availability zone count.
    pub fn with_az_count(mut self, az_count: u32) -> Self {
        self.az_count = az_count;
        self
    }

    /// Set the NAT gateway strategy.
    pub fn with_nat(mut self, nat: NatStrategy) -> Self {
        self.nat = nat;
        self
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("{}/{}", ResourceKind::Network, self.name);
        if self.name.is_empty() {
            return Err(Error::validation_field(resource, "name", "must not be empty"));
        }
        if self.az_count == 0 {
            return Err(Error::validation_field(
                resource,
                "azCount",
                "at least one availability zone is required",
            ));
        }
        if self.subnets.is_empty() {
            return Err(Error::validation_field(
                resource,
                "subnets",
                "at least one subnet template is required",
            ));
        }
        for (i, subnet) in self.subnets.iter().enumerate() {
            if subnet.name.is_empty() {
                return Err(Error::validation_field(
                    &resource,
                    "subnets",
                    format!("subnet {} has an empty name", i),
                ));
            }
            if !self.cidr.admits_mask(subnet.mask) {
                return Err(Error::validation_field(
                    &resource,
                    "subnets",
                    format!(
                        "subnet '{}' mask /{} does not fit inside {}",
                        subnet.name, subnet.mask, self.cidr
                    ),
                ));
            }
            if subnet.mask > MAX_SUBNET_PREFIX {
                return Err(Error::validation_field(
                    &resource,
                    "subnets",
                    format!(
                        "subnet '{}' mask /{} is longer than the /{} AWS limit",
                        subnet.name, subnet.mask, MAX_SUBNET_PREFIX
                    ),
                ));
            }
            if self.subnets[..i].iter().any(|s| s.name == subnet.name) {
                return Err(Error::validation_field(
                    &resource,
                    "subnets",
                    format!("duplicate subnet name '{}'", subnet.name),
                ));
            }
        }
        // Load balancers and NAT gateways attach to public subnets;
        // worker nodes are placed in private ones. Both tiers required.
        if !self.subnets.iter().any(|s| s.kind == SubnetKind::Public) {
            return Err(Error::validation_field(
                resource,
                "subnets",
                "at least one public subnet is required",
            ));
        }
        if !self.subnets.iter().any(|s| s.kind == SubnetKind::Private) {
            return Err(Error::validation_field(
                resource,
                "subnets",
                "at least one private subnet is required",
            ));
        }
        Ok(())
    }
}
