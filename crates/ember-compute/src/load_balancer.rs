//! AWS load balancer controller
//!
//! Installed from the eks-charts Helm repository into `kube-system`. The chart
//! does not create its service account; we declare it ourselves so it can
//! carry the IRSA role annotation.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use tracing::debug;

use ember_common::iam::{RoleBuilder, RoleRef};
use ember_common::{token, LogicalId, Result, Scope};
use ember_network::NetworkRef;

use crate::cluster::{ClusterRef, STS_AUDIENCE};
use crate::irsa::{declare_condition_block, web_identity_statement, ClaimCondition};
use crate::manifest::{declare_helm_chart, declare_manifest, set_path, to_document, HelmChart};

/// Release, chart and service account name
pub const CONTROLLER_NAME: &str = "aws-load-balancer-controller";

/// Helm repository of the chart
pub const CHART_REPOSITORY: &str = "https://aws.github.io/eks-charts";

const NAMESPACE: &str = "kube-system";
const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// What the controller installation declared
#[derive(Clone, Debug, PartialEq)]
pub struct LoadBalancerControllerRef {
    /// Role assumed by the controller pods
    pub role: RoleRef,
    /// Service account manifest
    pub service_account: LogicalId,
    /// Helm release
    pub chart: LogicalId,
}

/// Declare the controller at image tag `version`
pub fn declare_load_balancer_controller(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    network: &NetworkRef,
    version: &str,
) -> Result<LoadBalancerControllerRef> {
    let (_, conditions) = declare_condition_block(
        scope,
        cluster,
        "LoadBalancerControllerCondition",
        &[
            ClaimCondition::literal("aud", STS_AUDIENCE),
            ClaimCondition::literal(
                "sub",
                &format!("system:serviceaccount:{NAMESPACE}:{CONTROLLER_NAME}"),
            ),
        ],
    )?;
    let role = RoleBuilder::trusting("LoadBalancerControllerRole")
        .with_trust_statement(
            web_identity_statement(cluster).with_condition_block("StringEquals", conditions),
        )
        .with_managed_policy("ElasticLoadBalancingFullAccess")
        .declare(scope)?;

    let account = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_NAME.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(
                [("app.kubernetes.io/name".to_string(), CONTROLLER_NAME.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut document = to_document(&account)?;
    set_path(
        &mut document,
        &["metadata", "annotations", ROLE_ARN_ANNOTATION],
        role.arn(),
    )?;
    let service_account =
        declare_manifest(scope, cluster, "LoadBalancerControllerServiceAccount", vec![document])?;

    let chart = declare_helm_chart(
        scope,
        cluster,
        "LoadBalancerController",
        &HelmChart {
            release: CONTROLLER_NAME.to_string(),
            chart: CONTROLLER_NAME.to_string(),
            repository: CHART_REPOSITORY.to_string(),
            namespace: NAMESPACE.to_string(),
            values: json!({
                "clusterName": cluster.name(),
                "serviceAccount": { "create": false, "name": CONTROLLER_NAME },
                "region": token::pseudo(token::REGION),
                "vpcId": network.vpc_id(),
                "image": { "tag": version }
            }),
        },
    )?;
    scope.depend(&chart, &service_account)?;
    scope.depend(&chart, cluster.capacity.id())?;
    debug!(chart = %chart, version, "declared load balancer controller");

    Ok(LoadBalancerControllerRef {
        role,
        service_account,
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::declare_cluster;
    use crate::manifest::documents;
    use crate::ComputeSpec;
    use ember_common::ResourceGraph;
    use ember_network::{declare_vpc, NetworkSpec};

    fn declared() -> (ResourceGraph, ClusterRef, LoadBalancerControllerRef) {
        let mut graph = ResourceGraph::new();
        let network =
            declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default()).expect("network");
        let (cluster, controller) = {
            let mut scope = graph.scope("Compute");
            let cluster =
                declare_cluster(&mut scope, &network, &ComputeSpec::default()).expect("cluster");
            let controller = declare_load_balancer_controller(&mut scope, &cluster, &network, "v2.3.0")
                .expect("controller");
            (cluster, controller)
        };
        (graph, cluster, controller)
    }

    #[test]
    fn test_service_account_carries_role_annotation() {
        let (graph, _, controller) = declared();
        let manifest = graph.get(&controller.service_account).expect("service account");
        let document = &documents(manifest)[0];
        assert_eq!(document["kind"], json!("ServiceAccount"));
        assert_eq!(
            document["metadata"]["annotations"][ROLE_ARN_ANNOTATION],
            controller.role.arn()
        );
    }

    #[test]
    fn test_chart_follows_service_account_and_capacity() {
        let (graph, cluster, controller) = declared();
        let dependencies = graph.explicit_dependencies(&controller.chart);
        assert!(dependencies.contains(&controller.service_account));
        assert!(dependencies.contains(cluster.capacity.id()));

        let chart = graph.get(&controller.chart).expect("chart");
        assert_eq!(chart.properties["Values"]["image"]["tag"], json!("v2.3.0"));
        assert_eq!(chart.properties["Values"]["serviceAccount"]["create"], json!(false));
        assert_eq!(chart.properties["Repository"], json!(CHART_REPOSITORY));
        graph.validate().expect("graph is consistent");
    }

    #[test]
    fn test_role_trusts_only_the_controller_service_account() {
        let (graph, _, controller) = declared();
        let role = graph.get(&controller.role.role).expect("role");
        let statements = role.properties["AssumeRolePolicyDocument"]["Statement"]
            .as_array()
            .expect("statements");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Action"], json!(["sts:AssumeRoleWithWebIdentity"]));

        let condition = graph
            .get_str("ComputeLoadBalancerControllerCondition")
            .expect("condition block");
        let parts = condition.properties["Value"]["Fn::Join"][1]
            .as_array()
            .expect("parts");
        assert_eq!(
            parts.last(),
            Some(&json!(
                ":sub\":\"system:serviceaccount:kube-system:aws-load-balancer-controller\"}"
            ))
        );
    }
}
