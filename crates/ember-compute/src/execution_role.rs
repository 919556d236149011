//! Job execution role of the analytics virtual cluster

use tracing::debug;

use ember_common::iam::{Principal, RoleBuilder, RoleRef};
use ember_common::{token, Result, Scope};

use crate::cluster::{ClusterRef, STS_AUDIENCE};
use crate::irsa::{declare_condition_block, web_identity_statement, ClaimCondition};
use crate::rbac::check_namespace_name;

/// AWS managed policies attached to the execution role
pub const EXECUTION_ROLE_POLICIES: [&str; 4] = [
    "AmazonS3FullAccess",
    "AmazonEC2FullAccess",
    "AWSGlueConsoleFullAccess",
    "CloudWatchFullAccess",
];

/// Service-account name pattern the analytics service creates for job pods
pub fn service_account_pattern(namespace: &str) -> String {
    format!(
        "system:serviceaccount:{namespace}:emr-containers-sa-*-*-${{{}}}-*",
        token::ACCOUNT_ID
    )
}

/// Declare the execution role.
///
/// The role is assumable by EC2 and, through the cluster's identity provider,
/// by job pods. Web identity assumption always requires the STS audience; with
/// `restrict_service_accounts` the subject must also match the service
/// accounts the analytics service creates in `namespace`.
pub fn declare_execution_role(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    namespace: &str,
    restrict_service_accounts: bool,
) -> Result<RoleRef> {
    check_namespace_name(scope.group(), "analyticsNamespace", namespace)?;
    let (_, audience) = declare_condition_block(
        scope,
        cluster,
        "ExecutionRoleAudienceCondition",
        &[ClaimCondition::literal("aud", STS_AUDIENCE)],
    )?;
    let mut trust = web_identity_statement(cluster).with_condition_block("StringEquals", audience);
    if restrict_service_accounts {
        let (_, subject) = declare_condition_block(
            scope,
            cluster,
            "ExecutionRoleSubjectCondition",
            &[ClaimCondition::token(
                "sub",
                token::sub(service_account_pattern(namespace)),
            )],
        )?;
        trust = trust.with_condition_block("StringLike", subject);
    }

    let mut builder = RoleBuilder::new("ExecutionRole", Principal::service("ec2.amazonaws.com"))
        .with_description("Runs analytics jobs submitted to the virtual cluster")
        .with_trust_statement(trust);
    for policy in EXECUTION_ROLE_POLICIES {
        builder = builder.with_managed_policy(policy);
    }
    let role = builder.declare(scope)?;
    debug!(role = %role.role, namespace, restrict_service_accounts, "declared execution role");
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::declare_cluster;
    use crate::ComputeSpec;
    use ember_common::ResourceGraph;
    use ember_network::{declare_vpc, NetworkSpec};
    use rstest::rstest;
    use serde_json::json;

    fn declare(restrict: bool) -> (ResourceGraph, RoleRef) {
        let mut graph = ResourceGraph::new();
        let network =
            declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default()).expect("network");
        let role = {
            let mut scope = graph.scope("Compute");
            let cluster =
                declare_cluster(&mut scope, &network, &ComputeSpec::default()).expect("cluster");
            declare_execution_role(&mut scope, &cluster, "spark", restrict).expect("role")
        };
        (graph, role)
    }

    #[test]
    fn test_four_managed_policies() {
        let (graph, role) = declare(true);
        let resource = graph.get(&role.role).expect("role");
        let policies = resource.properties["ManagedPolicyArns"]
            .as_array()
            .expect("policies");
        assert_eq!(policies.len(), 4);
        assert_eq!(
            policies[2],
            json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/AWSGlueConsoleFullAccess" })
        );
    }

    #[rstest]
    #[case::restricted(true, 2)]
    #[case::audience_only(false, 1)]
    fn test_trust_conditions(#[case] restrict: bool, #[case] operators: usize) {
        let (graph, role) = declare(restrict);
        let resource = graph.get(&role.role).expect("role");
        let statements = resource.properties["AssumeRolePolicyDocument"]["Statement"]
            .as_array()
            .expect("statements");
        assert_eq!(statements.len(), 2);
        let web_identity = &statements[1];
        assert_eq!(web_identity["Action"], json!(["sts:AssumeRoleWithWebIdentity"]));
        assert_eq!(
            web_identity["Principal"]["Federated"],
            json!({ "Ref": "ComputeOidcProvider" })
        );
        let condition = web_identity["Condition"].as_object().expect("condition");
        assert_eq!(condition.len(), operators);
        assert_eq!(
            condition["StringEquals"],
            json!({ "Fn::GetAtt": ["ComputeExecutionRoleAudienceCondition", "Value"] })
        );
        graph.validate().expect("graph is consistent");
    }

    #[test]
    fn test_namespace_outside_label_grammar_is_rejected() {
        let mut graph = ResourceGraph::new();
        let network =
            declare_vpc(&mut graph.scope("Network"), &NetworkSpec::default()).expect("network");
        let mut scope = graph.scope("Compute");
        let cluster =
            declare_cluster(&mut scope, &network, &ComputeSpec::default()).expect("cluster");
        assert!(declare_execution_role(&mut scope, &cluster, "${AWS::Region}", true).is_err());
    }

    #[test]
    fn test_subject_pattern_is_namespace_scoped() {
        assert_eq!(
            service_account_pattern("spark"),
            "system:serviceaccount:spark:emr-containers-sa-*-*-${AWS::AccountId}-*"
        );
    }
}
