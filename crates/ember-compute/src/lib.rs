//! Compute declaration: managed Kubernetes cluster, admin bindings, RBAC for
//! the analytics service, its execution role and the analytics virtual cluster
//!
//! [`declare`] lays the pieces out in a fixed order. Everything the virtual
//! cluster needs inside Kubernetes (namespace, role binding, identity
//! mappings) is tied to it with explicit edges, since none of it is referenced
//! by value.

#![deny(missing_docs)]

pub mod aws_auth;
pub mod cluster;
pub mod execution_role;
pub mod irsa;
pub mod load_balancer;
pub mod manifest;
pub mod rbac;
pub mod virtual_cluster;

pub use aws_auth::{admin_bindings, AwsAuth, IdentityBinding, IdentityKind, MASTERS_GROUP};
pub use cluster::{declare_cluster, Capacity, ClusterRef};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use ember_common::iam::RoleRef;
use ember_common::id::NameGenerator;
use ember_common::{token, LogicalId, Result, Scope};
use ember_network::NetworkRef;

use crate::load_balancer::{declare_load_balancer_controller, LoadBalancerControllerRef};
use crate::rbac::{declare_namespace, declare_rbac, RbacRef};

/// Fixed-size node pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePoolSpec {
    /// EC2 instance type
    pub instance_type: String,
    /// Node count
    pub desired_size: u32,
    /// Lower bound, defaults to `desired_size`
    pub min_size: Option<u32>,
    /// Upper bound, defaults to `desired_size`
    pub max_size: Option<u32>,
}

impl Default for NodePoolSpec {
    fn default() -> Self {
        Self {
            instance_type: "m5.large".to_string(),
            desired_size: 2,
            min_size: None,
            max_size: None,
        }
    }
}

/// Where pods run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CapacityMode {
    /// Fargate, one micro-VM per pod
    Serverless,
    /// Managed node group
    NodePool(NodePoolSpec),
}

impl Default for CapacityMode {
    fn default() -> Self {
        Self::NodePool(NodePoolSpec::default())
    }
}

/// Compute declaration inputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeSpec {
    /// Kubernetes version of the control plane
    pub kubernetes_version: String,
    /// Capacity mode
    pub capacity: CapacityMode,
    /// Namespace the analytics service runs jobs in
    pub analytics_namespace: String,
    /// Further namespaces to create
    pub additional_namespaces: Vec<String>,
    /// Load balancer controller image tag; `None` skips the controller
    pub load_balancer_controller: Option<String>,
    /// Restrict web identity assumption of the execution role to job service accounts
    pub restrict_service_accounts: bool,
    /// Name of the analytics virtual cluster
    pub virtual_cluster_name: String,
}

impl Default for ComputeSpec {
    fn default() -> Self {
        Self {
            kubernetes_version: "1.21".to_string(),
            capacity: CapacityMode::default(),
            analytics_namespace: "spark".to_string(),
            additional_namespaces: Vec::new(),
            load_balancer_controller: Some("v2.3.0".to_string()),
            restrict_service_accounts: true,
            virtual_cluster_name: "EMRCluster".to_string(),
        }
    }
}

/// What dependents see of the compute declaration
#[derive(Clone, Debug, PartialEq)]
pub struct ComputeRef {
    /// The cluster
    pub cluster: ClusterRef,
    /// Analytics namespace name
    pub namespace: String,
    /// Namespace, role and binding manifests of the analytics namespace
    pub rbac: RbacRef,
    /// Manifests of the additional namespaces
    pub additional_namespaces: Vec<LogicalId>,
    /// aws-auth manifest
    pub aws_auth: LogicalId,
    /// Identity mappings written to aws-auth
    pub identity_mappings: Vec<IdentityBinding>,
    /// Job execution role
    pub execution_role: RoleRef,
    /// Analytics virtual cluster
    pub virtual_cluster: LogicalId,
    /// Load balancer controller, when installed
    pub load_balancer_controller: Option<LoadBalancerControllerRef>,
}

impl ComputeRef {
    /// Cluster name token
    pub fn cluster_name(&self) -> Value {
        self.cluster.name()
    }

    /// Execution role ARN token
    pub fn execution_role_arn(&self) -> Value {
        self.execution_role.arn()
    }

    /// Virtual cluster id token
    pub fn virtual_cluster_id(&self) -> Value {
        token::attribute(&self.virtual_cluster, "Id")
    }
}

/// Declare the compute cluster in `scope`.
///
/// `admins` are IAM user names of the deploying account granted
/// `system:masters`; `names` derives one mapping name per admin.
pub fn declare(
    scope: &mut Scope<'_>,
    network: &NetworkRef,
    spec: &ComputeSpec,
    admins: &[String],
    names: &dyn NameGenerator,
) -> Result<ComputeRef> {
    info!(
        group = scope.group(),
        version = %spec.kubernetes_version,
        admins = admins.len(),
        namespace = %spec.analytics_namespace,
        "declaring compute cluster"
    );
    rbac::check_namespace_name(scope.group(), "analyticsNamespace", &spec.analytics_namespace)?;
    let cluster = declare_cluster(scope, network, spec)?;

    let mut aws_auth = AwsAuth::new();
    aws_auth.add(aws_auth::capacity_binding(&cluster.capacity)?)?;
    for binding in admin_bindings(admins, names)? {
        aws_auth.add(binding)?;
    }

    let namespace_manifest = declare_namespace(scope, &cluster, &spec.analytics_namespace)?;
    let additional_namespaces = spec
        .additional_namespaces
        .iter()
        .filter(|ns| **ns != spec.analytics_namespace)
        .map(|ns| declare_namespace(scope, &cluster, ns))
        .collect::<Result<Vec<_>>>()?;
    let rbac = declare_rbac(scope, &cluster, &namespace_manifest, &spec.analytics_namespace)?;

    aws_auth.add(aws_auth::service_linked_binding()?)?;
    let aws_auth_manifest = aws_auth.declare(scope, &cluster)?;

    let execution_role = execution_role::declare_execution_role(
        scope,
        &cluster,
        &spec.analytics_namespace,
        spec.restrict_service_accounts,
    )?;

    let virtual_cluster = virtual_cluster::declare_virtual_cluster(
        scope,
        &cluster,
        &spec.virtual_cluster_name,
        &spec.analytics_namespace,
        &[&rbac.namespace, &rbac.binding, &aws_auth_manifest],
    )?;

    let load_balancer_controller = spec
        .load_balancer_controller
        .as_deref()
        .map(|version| declare_load_balancer_controller(scope, &cluster, network, version))
        .transpose()?;

    Ok(ComputeRef {
        cluster,
        namespace: spec.analytics_namespace.clone(),
        rbac,
        additional_namespaces,
        aws_auth: aws_auth_manifest,
        identity_mappings: aws_auth.bindings().to_vec(),
        execution_role,
        virtual_cluster,
        load_balancer_controller,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{documents, is_kind};
    use ember_common::id::IdentitySuffixNames;
    use ember_common::{Error, ResourceGraph};
    use ember_network::{declare_vpc, NetworkSpec};
    use serde_json::json;

    fn declared(spec: &ComputeSpec, admins: &[&str]) -> (ResourceGraph, ComputeRef) {
        let admins: Vec<String> = admins.iter().map(|s| s.to_string()).collect();
        let mut graph = ResourceGraph::new();
        let network =
            declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default()).expect("network");
        let compute = declare(
            &mut graph.scope("Compute"),
            &network,
            spec,
            &admins,
            &IdentitySuffixNames,
        )
        .expect("compute declares");
        (graph, compute)
    }

    #[test]
    fn test_virtual_cluster_follows_namespace_and_binding() {
        let (graph, compute) = declared(&ComputeSpec::default(), &["alice"]);
        let dependencies = graph.explicit_dependencies(&compute.virtual_cluster);
        assert!(dependencies.contains(&compute.rbac.namespace));
        assert!(dependencies.contains(&compute.rbac.binding));
        assert!(dependencies.contains(&compute.aws_auth));

        let virtual_cluster = graph.get(&compute.virtual_cluster).expect("virtual cluster");
        assert_eq!(
            virtual_cluster.properties["ContainerProvider"],
            json!({
                "Id": { "Ref": "ComputeMainCluster" },
                "Type": "EKS",
                "Info": { "EksInfo": { "Namespace": "spark" } }
            })
        );
        assert_eq!(virtual_cluster.properties["Name"], json!("EMRCluster"));
        graph.validate().expect("graph is consistent");
    }

    #[test]
    fn test_aws_auth_carries_every_mapping() {
        let (graph, compute) = declared(&ComputeSpec::default(), &["alice", "bob"]);
        let names: Vec<_> = compute
            .identity_mappings
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "NodeRoleMapping",
                "ClusterAdminAlice",
                "ClusterAdminBob",
                "EmrContainersMapping"
            ]
        );

        let manifest = graph.get(&compute.aws_auth).expect("aws-auth");
        assert_eq!(manifest.properties["Overwrite"], json!(true));
        let users = documents(manifest)[0]["data"]["mapUsers"]["Fn::Sub"]
            .as_str()
            .expect("users");
        let users: Vec<serde_json::Value> = serde_json::from_str(users).expect("users parse");
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u["groups"] == json!([MASTERS_GROUP])));
    }

    #[test]
    fn test_analytics_namespace_must_be_a_label() {
        let spec = ComputeSpec {
            analytics_namespace: "spark\",\"x".to_string(),
            ..ComputeSpec::default()
        };
        let mut graph = ResourceGraph::new();
        let network =
            declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default()).expect("network");
        let err = declare(&mut graph.scope("Compute"), &network, &spec, &[], &IdentitySuffixNames)
            .expect_err("quoted namespace");
        match err {
            Error::Validation { scope, field, .. } => {
                assert_eq!(scope, "Compute");
                assert_eq!(field.as_deref(), Some("analyticsNamespace"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_no_admins_still_maps_service_role() {
        let (_, compute) = declared(&ComputeSpec::default(), &[]);
        assert_eq!(compute.identity_mappings.len(), 2);
        assert!(compute
            .identity_mappings
            .iter()
            .all(|b| b.groups.iter().all(|g| g != MASTERS_GROUP)));
    }

    #[test]
    fn test_additional_namespaces_get_manifests() {
        let spec = ComputeSpec {
            additional_namespaces: vec!["spark".to_string(), "batch-jobs".to_string()],
            load_balancer_controller: None,
            ..ComputeSpec::default()
        };
        let (graph, compute) = declared(&spec, &[]);
        assert_eq!(compute.additional_namespaces.len(), 1);
        assert_eq!(compute.additional_namespaces[0].as_str(), "ComputeBatchJobsNamespace");
        assert!(compute.load_balancer_controller.is_none());
        let namespaces = graph
            .resources()
            .filter(|r| documents(r).iter().any(|d| is_kind(d, "Namespace")))
            .count();
        assert_eq!(namespaces, 2);
    }

    #[test]
    fn test_serverless_maps_pod_execution_role() {
        let spec = ComputeSpec {
            capacity: CapacityMode::Serverless,
            ..ComputeSpec::default()
        };
        let (graph, compute) = declared(&spec, &["alice"]);
        assert_eq!(compute.identity_mappings[0].name.as_str(), "PodExecutionRoleMapping");
        graph.validate().expect("graph is consistent");
    }

    #[test]
    fn test_spec_deserializes_capacity_mode() {
        let spec: ComputeSpec = serde_yaml::from_str(
            r#"
analyticsNamespace: jobs
capacity:
  mode: node-pool
  instanceType: r5.xlarge
  desiredSize: 3
"#,
        )
        .expect("spec parses");
        assert_eq!(spec.analytics_namespace, "jobs");
        assert_eq!(spec.kubernetes_version, "1.21");
        assert_eq!(
            spec.capacity,
            CapacityMode::NodePool(NodePoolSpec {
                instance_type: "r5.xlarge".to_string(),
                desired_size: 3,
                min_size: None,
                max_size: None,
            })
        );

        let spec: ComputeSpec =
            serde_yaml::from_str("capacity: { mode: serverless }").expect("spec parses");
        assert_eq!(spec.capacity, CapacityMode::Serverless);
    }
}
