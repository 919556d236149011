//! The studio resource and its administrator session mapping

use serde::{Deserialize, Serialize};
use serde_json::json;

use ember_common::iam::RoleRef;
use ember_common::{token, LogicalId, Resource, Result, Scope};
use ember_network::NetworkRef;

use crate::security_groups::SecurityGroupsRef;

/// How users sign in to the studio
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMode {
    /// IAM Identity Center users and groups; session policies come from mappings
    #[default]
    Sso,
    /// IAM principals; permissions come from their own policies
    Iam,
}

impl AuthMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sso => "SSO",
            Self::Iam => "IAM",
        }
    }
}

/// Everything the studio resource is bound to
pub(crate) struct StudioBindings<'a> {
    pub(crate) name: &'a str,
    pub(crate) auth_mode: AuthMode,
    pub(crate) bucket: &'a LogicalId,
    pub(crate) location_prefix: &'a str,
    pub(crate) security_groups: &'a SecurityGroupsRef,
    pub(crate) service_role: &'a RoleRef,
    pub(crate) user_role: Option<&'a RoleRef>,
    pub(crate) network: &'a NetworkRef,
}

pub(crate) fn declare_studio(scope: &mut Scope<'_>, bindings: &StudioBindings<'_>) -> Result<LogicalId> {
    let id = scope.id("Studio")?;
    let mut studio = Resource::new("AWS::EMR::Studio", id).with_properties(json!({
        "AuthMode": bindings.auth_mode.as_str(),
        "DefaultS3Location": token::sub(format!(
            "s3://${{{}}}/{}",
            bindings.bucket, bindings.location_prefix
        )),
        "EngineSecurityGroupId": bindings.security_groups.engine_id(),
        "Name": bindings.name,
        "ServiceRole": bindings.service_role.arn(),
        "SubnetIds": bindings.network.private_subnet_ids(),
        "VpcId": bindings.network.vpc_id(),
        "WorkspaceSecurityGroupId": bindings.security_groups.workspace_id()
    }));
    if let Some(user_role) = bindings.user_role {
        studio = studio.with_property("UserRole", user_role.arn());
    }
    scope.add(studio)
}

pub(crate) fn declare_session_mapping(
    scope: &mut Scope<'_>,
    studio: &LogicalId,
    identity: &str,
    session_policy: &LogicalId,
) -> Result<LogicalId> {
    let id = scope.id("SessionMapping")?;
    scope.add(
        Resource::new("AWS::EMR::StudioSessionMapping", id).with_properties(json!({
            "IdentityName": identity,
            "IdentityType": "USER",
            "SessionPolicyArn": token::reference(session_policy),
            "StudioId": token::attribute(studio, "StudioId")
        })),
    )
}
