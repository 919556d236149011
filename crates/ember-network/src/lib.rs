//! Virtual network declaration
//!
//! Declares an isolated VPC with per-AZ subnets for each configured subnet
//! group, the gateways and routes those subnet types need, and optional
//! service endpoints. Dependents receive a [`NetworkRef`]: the VPC id plus one
//! record per subnet group.

#![deny(missing_docs)]

mod cidr;
mod endpoints;
mod vpc;

pub use cidr::{allocate, MIN_SUBNET_PREFIX, MIN_VPC_PREFIX};
pub use endpoints::declare_service_endpoints;
pub use vpc::declare_vpc;

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use ember_common::{token, LogicalId, Result, Scope};

/// Subnet flavour
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    /// Routable from the internet through the internet gateway
    Public,
    /// Private, outbound traffic through a NAT gateway
    #[serde(alias = "private-with-nat")]
    PrivateWithGateway,
}

impl SubnetType {
    /// Whether this is a private subnet type
    pub fn is_private(self) -> bool {
        matches!(self, Self::PrivateWithGateway)
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::PrivateWithGateway => "Private",
        }
    }
}

/// One subnet group, materialized once per availability zone
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetGroupSpec {
    /// Group name (e.g. "private-subnet-1")
    pub name: String,
    /// Subnet flavour
    pub subnet_type: SubnetType,
    /// Prefix length of each subnet in the group
    pub cidr_mask: u8,
}

/// How a service endpoint attaches to the VPC
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Elastic network interfaces in the private subnets
    #[default]
    Interface,
    /// Route-table entries (S3 and DynamoDB only)
    Gateway,
}

/// A provider service reachable privately from inside the VPC
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointSpec {
    /// Service short name, e.g. "emr-containers" or "s3"
    pub service: String,
    /// Attachment kind
    #[serde(default)]
    pub kind: EndpointKind,
    /// Enable private DNS for interface endpoints
    #[serde(default = "default_private_dns")]
    pub private_dns: bool,
}

/// Address block of the reference deployment
pub const DEFAULT_VPC_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 16);

fn default_private_dns() -> bool {
    true
}

impl ServiceEndpointSpec {
    /// Interface endpoint for `service`
    pub fn interface(service: &str) -> Self {
        Self {
            service: service.to_string(),
            kind: EndpointKind::Interface,
            private_dns: true,
        }
    }

    /// Gateway endpoint for `service`
    pub fn gateway(service: &str) -> Self {
        Self {
            service: service.to_string(),
            kind: EndpointKind::Gateway,
            private_dns: false,
        }
    }
}

/// Network inputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSpec {
    /// VPC address block
    pub vpc_cidr: Ipv4Net,
    /// Availability zones to spread each subnet group over
    pub max_azs: usize,
    /// NAT gateways, placed in the public subnets
    pub nat_gateways: usize,
    /// Subnet groups in allocation order
    pub subnets: Vec<SubnetGroupSpec>,
    /// Service endpoints (may be empty)
    pub service_endpoints: Vec<ServiceEndpointSpec>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            vpc_cidr: DEFAULT_VPC_CIDR,
            max_azs: 2,
            nat_gateways: 1,
            subnets: vec![
                SubnetGroupSpec {
                    name: "private-subnet-1".to_string(),
                    subnet_type: SubnetType::PrivateWithGateway,
                    cidr_mask: 24,
                },
                SubnetGroupSpec {
                    name: "public-subnet-1".to_string(),
                    subnet_type: SubnetType::Public,
                    cidr_mask: 24,
                },
            ],
            service_endpoints: vec![
                ServiceEndpointSpec::interface("emr-containers"),
                ServiceEndpointSpec::interface("s3"),
            ],
        }
    }
}

/// One declared subnet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetRecord {
    /// Subnet logical id
    pub id: LogicalId,
    /// Route table associated with the subnet
    pub route_table: LogicalId,
    /// Allocated address range
    pub cidr: Ipv4Net,
    /// Availability zone index
    pub az_index: usize,
}

/// A declared subnet group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetGroupRecord {
    /// Group name
    pub name: String,
    /// Subnet flavour
    pub subnet_type: SubnetType,
    /// Prefix length
    pub cidr_mask: u8,
    /// One subnet per availability zone
    pub subnets: Vec<SubnetRecord>,
}

/// What dependents see of the network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkRef {
    /// VPC logical id
    pub vpc: LogicalId,
    /// VPC address block
    pub cidr: Ipv4Net,
    /// Subnet groups in declaration order
    pub subnet_groups: Vec<SubnetGroupRecord>,
}

impl NetworkRef {
    /// VPC id token
    pub fn vpc_id(&self) -> Value {
        token::reference(&self.vpc)
    }

    /// Subnets of one flavour across all groups
    pub fn subnets_of(&self, subnet_type: SubnetType) -> impl Iterator<Item = &SubnetRecord> {
        self.subnet_groups
            .iter()
            .filter(move |g| g.subnet_type == subnet_type)
            .flat_map(|g| g.subnets.iter())
    }

    /// Subnet id tokens of all private subnets
    pub fn private_subnet_ids(&self) -> Vec<Value> {
        self.subnets_of(SubnetType::PrivateWithGateway)
            .map(|s| token::reference(&s.id))
            .collect()
    }

    /// Subnet id tokens of all public subnets
    pub fn public_subnet_ids(&self) -> Vec<Value> {
        self.subnets_of(SubnetType::Public)
            .map(|s| token::reference(&s.id))
            .collect()
    }
}

/// Declare the network in `scope`
pub fn declare(scope: &mut Scope<'_>, spec: &NetworkSpec) -> Result<NetworkRef> {
    info!(
        group = scope.group(),
        cidr = %spec.vpc_cidr,
        azs = spec.max_azs,
        "declaring network"
    );
    let network = declare_vpc(scope, spec)?;
    declare_service_endpoints(scope, &network, &spec.service_endpoints)?;
    Ok(network)
}
