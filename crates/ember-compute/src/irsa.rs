//! IAM roles assumable by Kubernetes service accounts
//!
//! Trust conditions are keyed by the cluster's issuer host, which is only known
//! once the cluster exists. Policy condition keys cannot be tokens, so each
//! condition block is produced by a deferred-JSON resource whose `Value`
//! attribute is the parsed object.

use serde_json::{json, Value};

use ember_common::iam::{PolicyStatement, Principal};
use ember_common::{token, LogicalId, Resource, Result, Scope, TemplateParameter};

use crate::cluster::ClusterRef;

/// Resource type of a deferred-JSON value
pub const DEFERRED_JSON_TYPE: &str = "Custom::DeferredJson";

/// Template parameter holding the deferred-JSON handler function ARN
pub const DEFERRED_JSON_HANDLER_PARAMETER: &str = "DeferredJsonHandlerArn";

/// One issuer claim condition: `<issuer>:<claim> = value`
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimCondition {
    /// Claim name (`aud`, `sub`)
    pub claim: String,
    /// Expected value, may be a token
    pub value: Value,
}

impl ClaimCondition {
    /// Condition on a literal claim value
    pub fn literal(claim: &str, value: &str) -> Self {
        Self {
            claim: claim.to_string(),
            value: json!(value),
        }
    }

    /// Condition on a claim value computed at apply time
    pub fn token(claim: &str, value: Value) -> Self {
        Self {
            claim: claim.to_string(),
            value,
        }
    }
}

/// Join text and token fragments, merging adjacent literals
fn joined(parts: Vec<Value>) -> Value {
    let mut merged: Vec<Value> = Vec::with_capacity(parts.len());
    for part in parts {
        match (merged.last_mut(), &part) {
            (Some(Value::String(previous)), Value::String(next)) => previous.push_str(next),
            _ => merged.push(part),
        }
    }
    token::join("", merged)
}

/// JSON text `{"<issuer>:<claim>": "<value>", ...}` with the issuer spliced in
pub fn condition_document(cluster: &ClusterRef, conditions: &[ClaimCondition]) -> Value {
    let mut parts = vec![json!("{")];
    for (index, condition) in conditions.iter().enumerate() {
        if index > 0 {
            parts.push(json!(","));
        }
        parts.push(json!("\""));
        parts.push(cluster.issuer_host());
        parts.push(json!(format!(":{}\":", condition.claim)));
        match &condition.value {
            Value::String(literal) => {
                // literal values are written as JSON strings, quotes and escapes included
                parts.push(Value::String(Value::String(literal.clone()).to_string()))
            }
            value => {
                parts.push(json!("\""));
                parts.push(value.clone());
                parts.push(json!("\""));
            }
        }
    }
    parts.push(json!("}"));
    joined(parts)
}

/// Declare a deferred-JSON condition block named `local`; returns its `Value` token
pub fn declare_condition_block(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    local: &str,
    conditions: &[ClaimCondition],
) -> Result<(LogicalId, Value)> {
    let handler = scope.parameter(
        TemplateParameter::string(LogicalId::new(DEFERRED_JSON_HANDLER_PARAMETER)?)
            .with_description("ARN of the function parsing deferred JSON values"),
    )?;
    let id = scope.id(local)?;
    scope.add(
        Resource::new(DEFERRED_JSON_TYPE, id.clone()).with_properties(json!({
            "ServiceToken": handler,
            "Value": condition_document(cluster, conditions)
        })),
    )?;
    let value = token::attribute(&id, "Value");
    Ok((id, value))
}

/// `sts:AssumeRoleWithWebIdentity` trust statement for the cluster's OIDC provider
pub fn web_identity_statement(cluster: &ClusterRef) -> PolicyStatement {
    PolicyStatement::allow()
        .with_actions(["sts:AssumeRoleWithWebIdentity"])
        .with_principal(Principal::Federated(cluster.oidc_provider_arn()))
}
