//! Managed Kubernetes control plane, capacity and identity provider

use serde_json::{json, Value};
use tracing::debug;

use ember_common::iam::{Principal, RoleBuilder, RoleRef};
use ember_common::{token, Error, LogicalId, Resource, Result, Scope, TemplateParameter};
use ember_network::NetworkRef;

use crate::{CapacityMode, ComputeSpec};

/// Template parameter holding the kubectl handler function ARN
pub const KUBECTL_HANDLER_PARAMETER: &str = "KubectlHandlerArn";

/// Audience of tokens exchanged for IAM credentials
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";

/// SHA-1 thumbprint of the root CA behind the EKS OIDC endpoints
pub const OIDC_THUMBPRINT: &str = "9e99a48a9960b14926bb7f3b02e22da2b0ab7280";

/// Namespaces every serverless cluster must schedule
const SYSTEM_NAMESPACES: [&str; 2] = ["default", "kube-system"];

/// What capacity the cluster runs on, and the role that capacity assumes
#[derive(Clone, Debug, PartialEq)]
pub enum Capacity {
    /// Managed node group
    NodeGroup {
        /// Node group logical id
        id: LogicalId,
        /// Instance role of the nodes
        role: RoleRef,
    },
    /// Fargate profile
    Serverless {
        /// Fargate profile logical id
        id: LogicalId,
        /// Pod execution role
        role: RoleRef,
    },
}

impl Capacity {
    /// Logical id of the capacity resource
    pub fn id(&self) -> &LogicalId {
        match self {
            Self::NodeGroup { id, .. } | Self::Serverless { id, .. } => id,
        }
    }

    /// Role the capacity assumes
    pub fn role(&self) -> &RoleRef {
        match self {
            Self::NodeGroup { role, .. } | Self::Serverless { role, .. } => role,
        }
    }
}

/// A declared cluster
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterRef {
    /// Cluster logical id
    pub cluster: LogicalId,
    /// Control plane service role
    pub service_role: RoleRef,
    /// Worker capacity
    pub capacity: Capacity,
    /// OIDC identity provider logical id
    pub oidc_provider: LogicalId,
    /// Service token for manifests and Helm charts
    pub kubectl_handler: Value,
}

impl ClusterRef {
    /// Cluster name token
    pub fn name(&self) -> Value {
        token::reference(&self.cluster)
    }

    /// Cluster ARN token
    pub fn arn(&self) -> Value {
        token::attribute(&self.cluster, "Arn")
    }

    /// Issuer URL token (`https://oidc.eks.<region>.amazonaws.com/id/<id>`)
    pub fn issuer_url(&self) -> Value {
        token::attribute(&self.cluster, "OpenIdConnectIssuerUrl")
    }

    /// Issuer without the scheme, the prefix of every claim condition key
    pub fn issuer_host(&self) -> Value {
        token::select(1, token::split("https://", self.issuer_url()))
    }

    /// OIDC provider ARN token
    pub fn oidc_provider_arn(&self) -> Value {
        token::reference(&self.oidc_provider)
    }
}

/// Declare the control plane, its capacity and the OIDC provider
pub fn declare_cluster(
    scope: &mut Scope<'_>,
    network: &NetworkRef,
    spec: &ComputeSpec,
) -> Result<ClusterRef> {
    let subnets = network.private_subnet_ids();
    if subnets.is_empty() {
        return Err(Error::validation_for_field(
            scope.group(),
            "network",
            "the cluster needs at least one private subnet",
        ));
    }

    let kubectl_handler = scope.parameter(
        TemplateParameter::string(LogicalId::new(KUBECTL_HANDLER_PARAMETER)?)
            .with_description("ARN of the function applying Kubernetes manifests and Helm charts"),
    )?;

    let service_role = RoleBuilder::new("ClusterRole", Principal::service("eks.amazonaws.com"))
        .with_managed_policy("AmazonEKSClusterPolicy")
        .declare(scope)?;

    let cluster = scope.id("MainCluster")?;
    scope.add(
        Resource::new("AWS::EKS::Cluster", cluster.clone()).with_properties(json!({
            "Version": spec.kubernetes_version,
            "RoleArn": service_role.arn(),
            "ResourcesVpcConfig": {
                "SubnetIds": subnets,
                "EndpointPublicAccess": true,
                "EndpointPrivateAccess": true
            }
        })),
    )?;
    debug!(cluster = %cluster, version = %spec.kubernetes_version, "declared cluster");

    let capacity = match &spec.capacity {
        CapacityMode::NodePool(pool) => {
            if pool.desired_size == 0 {
                return Err(Error::validation_for_field(
                    scope.group(),
                    "capacity.desiredSize",
                    "a node pool needs at least one node",
                ));
            }
            let role = RoleBuilder::new("NodeRole", Principal::service("ec2.amazonaws.com"))
                .with_managed_policy("AmazonEKSWorkerNodePolicy")
                .with_managed_policy("AmazonEKS_CNI_Policy")
                .with_managed_policy("AmazonEC2ContainerRegistryReadOnly")
                .declare(scope)?;
            let id = scope.id("NodeGroup")?;
            scope.add(
                Resource::new("AWS::EKS::Nodegroup", id.clone()).with_properties(json!({
                    "ClusterName": token::reference(&cluster),
                    "NodeRole": role.arn(),
                    "Subnets": network.private_subnet_ids(),
                    "InstanceTypes": [pool.instance_type],
                    "AmiType": "AL2_x86_64",
                    "ScalingConfig": {
                        "DesiredSize": pool.desired_size,
                        "MinSize": pool.min_size.unwrap_or(pool.desired_size),
                        "MaxSize": pool.max_size.unwrap_or(pool.desired_size)
                    }
                })),
            )?;
            Capacity::NodeGroup { id, role }
        }
        CapacityMode::Serverless => {
            let role =
                RoleBuilder::new("PodExecutionRole", Principal::service("eks-fargate-pods.amazonaws.com"))
                    .with_managed_policy("AmazonEKSFargatePodExecutionRolePolicy")
                    .declare(scope)?;
            let selectors: Vec<Value> = SYSTEM_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .chain(std::iter::once(spec.analytics_namespace.clone()))
                .map(|ns| json!({ "Namespace": ns }))
                .collect();
            let id = scope.id("FargateProfile")?;
            scope.add(
                Resource::new("AWS::EKS::FargateProfile", id.clone()).with_properties(json!({
                    "ClusterName": token::reference(&cluster),
                    "PodExecutionRoleArn": role.arn(),
                    "Subnets": network.private_subnet_ids(),
                    "Selectors": selectors
                })),
            )?;
            Capacity::Serverless { id, role }
        }
    };

    let oidc_provider = scope.id("OidcProvider")?;
    scope.add(
        Resource::new("AWS::IAM::OIDCProvider", oidc_provider.clone()).with_properties(json!({
            "Url": token::attribute(&cluster, "OpenIdConnectIssuerUrl"),
            "ClientIdList": [STS_AUDIENCE],
            "ThumbprintList": [OIDC_THUMBPRINT]
        })),
    )?;

    Ok(ClusterRef {
        cluster,
        service_role,
        capacity,
        oidc_provider,
        kubectl_handler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodePoolSpec;
    use ember_common::ResourceGraph;
    use ember_network::{declare_vpc, NetworkSpec};

    fn declare(spec: &ComputeSpec) -> (ResourceGraph, ClusterRef) {
        let mut graph = ResourceGraph::new();
        let network = declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default())
            .expect("network");
        let cluster = declare_cluster(&mut graph.scope("Compute"), &network, spec)
            .expect("cluster declares");
        (graph, cluster)
    }

    #[test]
    fn test_cluster_uses_private_subnets_and_version() {
        let (graph, cluster) = declare(&ComputeSpec::default());
        let resource = graph.get(&cluster.cluster).expect("cluster");
        assert_eq!(resource.properties["Version"], json!("1.21"));
        let subnets = resource.properties["ResourcesVpcConfig"]["SubnetIds"]
            .as_array()
            .expect("subnets");
        assert_eq!(subnets.len(), 2);
        assert!(subnets
            .iter()
            .all(|s| s["Ref"].as_str().is_some_and(|r| r.contains("Private"))));
    }

    #[test]
    fn test_node_pool_capacity() {
        let (graph, cluster) = declare(&ComputeSpec::default());
        let Capacity::NodeGroup { id, role } = &cluster.capacity else {
            panic!("default capacity should be a node pool");
        };
        let nodes = graph.get(id).expect("node group");
        assert_eq!(nodes.properties["InstanceTypes"], json!(["m5.large"]));
        assert_eq!(nodes.properties["ScalingConfig"]["DesiredSize"], json!(2));
        let node_role = graph.get(&role.role).expect("node role");
        assert_eq!(
            node_role.properties["ManagedPolicyArns"]
                .as_array()
                .expect("policies")
                .len(),
            3
        );
    }

    #[test]
    fn test_serverless_capacity_selects_analytics_namespace() {
        let spec = ComputeSpec {
            capacity: CapacityMode::Serverless,
            ..ComputeSpec::default()
        };
        let (graph, cluster) = declare(&spec);
        let Capacity::Serverless { id, .. } = &cluster.capacity else {
            panic!("capacity should be serverless");
        };
        let profile = graph.get(id).expect("fargate profile");
        assert_eq!(
            profile.properties["Selectors"],
            json!([
                { "Namespace": "default" },
                { "Namespace": "kube-system" },
                { "Namespace": "spark" }
            ])
        );
    }

    #[test]
    fn test_empty_node_pool_is_rejected() {
        let mut graph = ResourceGraph::new();
        let network = declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default())
            .expect("network");
        let spec = ComputeSpec {
            capacity: CapacityMode::NodePool(NodePoolSpec {
                desired_size: 0,
                ..NodePoolSpec::default()
            }),
            ..ComputeSpec::default()
        };
        assert!(declare_cluster(&mut graph.scope("Compute"), &network, &spec).is_err());
    }

    #[test]
    fn test_oidc_provider_tracks_cluster_issuer() {
        let (graph, cluster) = declare(&ComputeSpec::default());
        let provider = graph.get(&cluster.oidc_provider).expect("provider");
        assert_eq!(provider.properties["ClientIdList"], json!([STS_AUDIENCE]));
        assert!(graph
            .dependencies_of(&cluster.oidc_provider)
            .contains(&cluster.cluster));
        assert_eq!(
            cluster.issuer_host(),
            json!({ "Fn::Select": [1, { "Fn::Split": ["https://", {
                "Fn::GetAtt": ["ComputeMainCluster", "OpenIdConnectIssuerUrl"]
            }] }] })
        );
    }
}
