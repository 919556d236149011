//! Engine and workspace isolation groups
//!
//! Three rules, nothing else: the workspace reaches anything on 443, the
//! workspace reaches the engine on the engine port, and the engine accepts the
//! workspace on that port. The engine keeps unrestricted egress.

use serde_json::json;

use ember_common::{token, LogicalId, Resource, Result, Scope};
use ember_network::NetworkRef;

/// TLS port the workspace may reach anywhere
pub const HTTPS_PORT: u16 = 443;

/// Port the notebook engine listens on
pub const DEFAULT_ENGINE_PORT: u16 = 18888;

const ANYWHERE: &str = "0.0.0.0/0";

/// The two groups and the rules between them
#[derive(Clone, Debug, PartialEq)]
pub struct SecurityGroupsRef {
    /// Group attached to the notebook engine
    pub engine: LogicalId,
    /// Group attached to workspaces
    pub workspace: LogicalId,
    /// Standalone rules linking the two groups
    pub rules: Vec<LogicalId>,
}

impl SecurityGroupsRef {
    /// Engine group id token
    pub fn engine_id(&self) -> serde_json::Value {
        token::attribute(&self.engine, "GroupId")
    }

    /// Workspace group id token
    pub fn workspace_id(&self) -> serde_json::Value {
        token::attribute(&self.workspace, "GroupId")
    }
}

/// Declare both groups and their rules
pub fn declare_security_groups(
    scope: &mut Scope<'_>,
    network: &NetworkRef,
    engine_port: u16,
) -> Result<SecurityGroupsRef> {
    let engine = scope.id("EngineSecurityGroup")?;
    scope.add(
        Resource::new("AWS::EC2::SecurityGroup", engine.clone()).with_properties(json!({
            "GroupDescription": format!("{}/EngineSecurityGroup", scope.group()),
            "VpcId": network.vpc_id(),
            "SecurityGroupEgress": [{
                "CidrIp": ANYWHERE,
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1"
            }]
        })),
    )?;

    let workspace = scope.id("WorkspaceSecurityGroup")?;
    scope.add(
        Resource::new("AWS::EC2::SecurityGroup", workspace.clone()).with_properties(json!({
            "GroupDescription": format!("{}/WorkspaceSecurityGroup", scope.group()),
            "VpcId": network.vpc_id(),
            "SecurityGroupEgress": [{
                "CidrIp": ANYWHERE,
                "Description": format!("allow egress on port {HTTPS_PORT}"),
                "FromPort": HTTPS_PORT,
                "IpProtocol": "tcp",
                "ToPort": HTTPS_PORT
            }]
        })),
    )?;

    let egress = scope.id("WorkspaceToEngineEgress")?;
    scope.add(
        Resource::new("AWS::EC2::SecurityGroupEgress", egress.clone()).with_properties(json!({
            "GroupId": token::attribute(&workspace, "GroupId"),
            "DestinationSecurityGroupId": token::attribute(&engine, "GroupId"),
            "Description": format!("allow egress on port {engine_port} to engine"),
            "FromPort": engine_port,
            "IpProtocol": "tcp",
            "ToPort": engine_port
        })),
    )?;

    let ingress = scope.id("EngineFromWorkspaceIngress")?;
    scope.add(
        Resource::new("AWS::EC2::SecurityGroupIngress", ingress.clone()).with_properties(json!({
            "GroupId": token::attribute(&engine, "GroupId"),
            "SourceSecurityGroupId": token::attribute(&workspace, "GroupId"),
            "Description": format!("allow ingress on port {engine_port} from workspace"),
            "FromPort": engine_port,
            "IpProtocol": "tcp",
            "ToPort": engine_port
        })),
    )?;

    Ok(SecurityGroupsRef {
        engine,
        workspace,
        rules: vec![egress, ingress],
    })
}
