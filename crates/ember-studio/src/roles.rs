//! Studio service role, administrator policy and user role

use ember_common::iam::{
    declare_managed_policy, PolicyDocument, PolicyStatement, Principal, RoleBuilder, RoleRef,
};
use ember_common::{token, LogicalId, Result, Scope};

const SERVICE_PRINCIPAL: &str = "elasticmapreduce.amazonaws.com";

const NETWORK_ACTIONS: &[&str] = &[
    "ec2:AuthorizeSecurityGroupEgress",
    "ec2:AuthorizeSecurityGroupIngress",
    "ec2:CreateSecurityGroup",
    "ec2:DescribeSecurityGroups",
    "ec2:RevokeSecurityGroupEgress",
    "ec2:RevokeSecurityGroupIngress",
    "ec2:CreateNetworkInterface",
    "ec2:CreateNetworkInterfacePermission",
    "ec2:DeleteNetworkInterface",
    "ec2:DeleteNetworkInterfacePermission",
    "ec2:DescribeNetworkInterfaces",
    "ec2:ModifyNetworkInterfaceAttribute",
    "ec2:DescribeTags",
    "ec2:DescribeInstances",
    "ec2:DescribeSubnets",
    "ec2:DescribeVpcs",
    "elasticmapreduce:ListInstances",
    "elasticmapreduce:DescribeCluster",
    "elasticmapreduce:ListSteps",
];

const OBJECT_ACTIONS: &[&str] = &[
    "s3:PutObject",
    "s3:GetObject",
    "s3:GetEncryptionConfiguration",
    "s3:ListBucket",
    "s3:DeleteObject",
];

const BASIC_ACTIONS: &[&str] = &[
    "elasticmapreduce:CreateEditor",
    "elasticmapreduce:DescribeEditor",
    "elasticmapreduce:ListEditors",
    "elasticmapreduce:StartEditor",
    "elasticmapreduce:StopEditor",
    "elasticmapreduce:DeleteEditor",
    "elasticmapreduce:OpenEditorInConsole",
    "elasticmapreduce:AttachEditor",
    "elasticmapreduce:DetachEditor",
    "elasticmapreduce:CreateRepository",
    "elasticmapreduce:DescribeRepository",
    "elasticmapreduce:DeleteRepository",
    "elasticmapreduce:ListRepositories",
    "elasticmapreduce:LinkRepository",
    "elasticmapreduce:UnlinkRepository",
    "elasticmapreduce:DescribeCluster",
    "elasticmapreduce:ListInstanceGroups",
    "elasticmapreduce:ListBootstrapActions",
    "elasticmapreduce:ListClusters",
    "elasticmapreduce:ListSteps",
    "elasticmapreduce:CreatePersistentAppUI",
    "elasticmapreduce:DescribePersistentAppUI",
    "elasticmapreduce:GetPersistentAppUIPresignedURL",
    "secretsmanager:CreateSecret",
    "secretsmanager:ListSecrets",
    "emr-containers:DescribeVirtualCluster",
    "emr-containers:ListVirtualClusters",
    "emr-containers:DescribeManagedEndpoint",
    "emr-containers:ListManagedEndpoints",
    "emr-containers:CreateAccessTokenForManagedEndpoint",
    "emr-containers:DescribeJobRun",
    "emr-containers:ListJobRuns",
];

const INTERMEDIATE_ACTIONS: &[&str] = &[
    "servicecatalog:DescribeProduct",
    "servicecatalog:DescribeProductView",
    "servicecatalog:DescribeProvisioningParameters",
    "servicecatalog:ProvisionProduct",
    "servicecatalog:SearchProducts",
    "servicecatalog:UpdateProvisionedProduct",
    "servicecatalog:ListProvisioningArtifacts",
    "servicecatalog:DescribeRecord",
    "cloudformation:DescribeStackResources",
];

/// Tag keys the service may put on the network interfaces it creates
const INTERFACE_TAG_KEYS: [&str; 2] = [
    "aws:elasticmapreduce:editor-id",
    "aws:elasticmapreduce:job-flow-id",
];

/// Service role: broad storage access plus the network management the studio needs
pub fn declare_service_role(scope: &mut Scope<'_>) -> Result<RoleRef> {
    RoleBuilder::new("ServiceRole", Principal::service(SERVICE_PRINCIPAL))
        .with_managed_policy("AmazonS3FullAccess")
        .with_statement(
            PolicyStatement::allow()
                .with_actions(NETWORK_ACTIONS.iter().copied())
                .with_resource("*"),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_actions(["ec2:CreateTags"])
                .with_resource_value(token::sub("arn:${AWS::Partition}:ec2:*:*:network-interface/*"))
                .with_condition(
                    "ForAllValues:StringEquals",
                    "aws:TagKeys",
                    serde_json::json!(INTERFACE_TAG_KEYS),
                ),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_actions(OBJECT_ACTIONS.iter().copied())
                .with_resource_value(token::sub("arn:${AWS::Partition}:s3:::*")),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_actions(["secretsmanager:GetSecretValue"])
                .with_resource_value(token::sub(
                    "arn:${AWS::Partition}:secretsmanager:*:*:secret:*",
                )),
        )
        .declare(scope)
}

/// Actions granted to studio administrators and users
pub fn admin_policy_document(service_role: &RoleRef, bucket: &LogicalId) -> PolicyDocument {
    PolicyDocument::new()
        .with_statement(
            PolicyStatement::allow()
                .with_sid("AllowBasicActions")
                .with_actions(BASIC_ACTIONS.iter().copied())
                .with_resource("*"),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_sid("AllowIntermediateActions")
                .with_actions(INTERMEDIATE_ACTIONS.iter().copied())
                .with_resource("*"),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_sid("AllowAdvancedActions")
                .with_actions(["elasticmapreduce:RunJobFlow"])
                .with_resource("*"),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_sid("PassRolePermission")
                .with_actions(["iam:PassRole"])
                .with_resource_value(service_role.arn())
                .with_resource_value(token::sub(
                    "arn:${AWS::Partition}:iam::${AWS::AccountId}:role/EMR_DefaultRole",
                ))
                .with_resource_value(token::sub(
                    "arn:${AWS::Partition}:iam::${AWS::AccountId}:role/EMR_EC2_DefaultRole",
                )),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_sid("S3ListPermission")
                .with_actions(["s3:ListAllMyBuckets", "s3:ListBucket", "s3:GetBucketLocation"])
                .with_resource_value(token::sub("arn:${AWS::Partition}:s3:::*")),
        )
        .with_statement(
            PolicyStatement::allow()
                .with_sid("S3GetObjectPermission")
                .with_actions(["s3:GetObject"])
                .with_resource_value(token::sub(format!(
                    "arn:${{AWS::Partition}}:s3:::${{{bucket}}}/*"
                )))
                .with_resource_value(token::sub(
                    "arn:${AWS::Partition}:s3:::aws-logs-${AWS::AccountId}-${AWS::Region}/elasticmapreduce/*",
                )),
        )
}

/// Declare the administrator managed policy
pub fn declare_admin_policy(
    scope: &mut Scope<'_>,
    service_role: &RoleRef,
    bucket: &LogicalId,
) -> Result<LogicalId> {
    declare_managed_policy(scope, "AdminPolicy", &admin_policy_document(service_role, bucket))
}

/// User role with the administrator policy attached
pub fn declare_user_role(scope: &mut Scope<'_>, admin_policy: &LogicalId) -> Result<RoleRef> {
    RoleBuilder::new("UserRole", Principal::service(SERVICE_PRINCIPAL))
        .with_managed_policy_arn(token::reference(admin_policy))
        .declare(scope)
}
