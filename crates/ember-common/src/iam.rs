//! IAM policy documents and role declarations
//!
//! Statements are typed so that effect, principal and condition blocks cannot
//! be misspelled; resources and condition values stay as JSON values because
//! they are usually tokens resolved at apply time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::Scope;
use crate::id::LogicalId;
use crate::resource::Resource;
use crate::{token, Error, Result};

/// Policy language version written into every document
pub const POLICY_VERSION: &str = "2012-10-17";

/// Resource type of an IAM role
pub const ROLE_TYPE: &str = "AWS::IAM::Role";

/// Resource type of an inline policy attached to roles
pub const POLICY_TYPE: &str = "AWS::IAM::Policy";

/// Resource type of a customer managed policy
pub const MANAGED_POLICY_TYPE: &str = "AWS::IAM::ManagedPolicy";

/// Statement effect
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grant
    #[default]
    Allow,
    /// Explicit deny
    Deny,
}

/// Who a trust statement applies to
#[derive(Clone, Debug, PartialEq)]
pub enum Principal {
    /// An AWS service, e.g. `eks.amazonaws.com`
    Service(String),
    /// A federated identity provider (usually a `Ref` to an OIDC provider)
    Federated(Value),
    /// An AWS account or IAM entity ARN
    Aws(Value),
}

impl Principal {
    /// Service principal shorthand
    pub fn service(name: &str) -> Self {
        Self::Service(name.to_string())
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Service(name) => json!({ "Service": name }),
            Self::Federated(provider) => json!({ "Federated": provider }),
            Self::Aws(arn) => json!({ "AWS": arn }),
        }
    }
}

/// One policy statement
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PolicyStatement {
    sid: Option<String>,
    effect: Effect,
    actions: Vec<String>,
    resources: Vec<Value>,
    principal: Option<Principal>,
    conditions: BTreeMap<String, Value>,
}

impl PolicyStatement {
    /// An `Allow` statement with no actions yet
    pub fn allow() -> Self {
        Self::default()
    }

    /// A `Deny` statement with no actions yet
    pub fn deny() -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::default()
        }
    }

    /// Set the statement id
    pub fn with_sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    /// Append actions
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Append a literal resource ARN pattern
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resources.push(Value::String(resource.to_string()));
        self
    }

    /// Append a resource that may be a token
    pub fn with_resource_value(mut self, resource: Value) -> Self {
        self.resources.push(resource);
        self
    }

    /// Set the principal (trust policies only)
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Add `key = value` under the condition `operator`, merging with earlier keys
    pub fn with_condition(mut self, operator: &str, key: &str, value: Value) -> Self {
        let block = self
            .conditions
            .entry(operator.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = block {
            map.insert(key.to_string(), value);
        } else {
            // a token block replaced earlier keys; start over with a literal map
            *block = json!({ (key): value });
        }
        self
    }

    /// Set a whole condition block to a value computed at apply time
    pub fn with_condition_block(mut self, operator: &str, block: Value) -> Self {
        self.conditions.insert(operator.to_string(), block);
        self
    }

    /// Actions of this statement
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Statement id, if any
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Render as a policy-language JSON object
    pub fn to_value(&self) -> Value {
        let mut statement = Map::new();
        if let Some(sid) = &self.sid {
            statement.insert("Sid".into(), json!(sid));
        }
        statement.insert("Effect".into(), json!(self.effect));
        if let Some(principal) = &self.principal {
            statement.insert("Principal".into(), principal.to_value());
        }
        statement.insert("Action".into(), json!(self.actions));
        if !self.resources.is_empty() {
            statement.insert("Resource".into(), Value::Array(self.resources.clone()));
        }
        if !self.conditions.is_empty() {
            statement.insert("Condition".into(), json!(self.conditions));
        }
        Value::Object(statement)
    }
}

/// An ordered list of statements
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Append a statement in place
    pub fn push(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    /// Statements in order
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Whether the document has no statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render as a policy-language JSON document
    pub fn to_value(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(PolicyStatement::to_value).collect::<Vec<_>>(),
        })
    }
}

/// A declared role and its optional default policy
#[derive(Clone, Debug, PartialEq)]
pub struct RoleRef {
    /// Logical id of the role
    pub role: LogicalId,
    /// Logical id of the inline default policy, when statements were added
    pub policy: Option<LogicalId>,
}

impl RoleRef {
    /// Role ARN token
    pub fn arn(&self) -> Value {
        token::attribute(&self.role, "Arn")
    }

    /// Role name token
    pub fn name(&self) -> Value {
        token::reference(&self.role)
    }
}

/// Declares an `AWS::IAM::Role`, plus a `<Role>DefaultPolicy` when it has statements
#[derive(Clone, Debug)]
pub struct RoleBuilder {
    local: String,
    assumed_by: Option<Principal>,
    trust: Vec<PolicyStatement>,
    managed_policies: Vec<Value>,
    statements: PolicyDocument,
    description: Option<String>,
}

impl RoleBuilder {
    /// Role named `local` inside the declaring scope, assumable by `assumed_by`
    pub fn new(local: &str, assumed_by: Principal) -> Self {
        Self {
            assumed_by: Some(assumed_by),
            ..Self::trusting(local)
        }
    }

    /// Role named `local` trusting only the statements added with [`Self::with_trust_statement`]
    pub fn trusting(local: &str) -> Self {
        Self {
            local: local.to_string(),
            assumed_by: None,
            trust: Vec::new(),
            managed_policies: Vec::new(),
            statements: PolicyDocument::new(),
            description: None,
        }
    }

    /// Attach an AWS managed policy by name
    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policies.push(token::managed_policy_arn(name));
        self
    }

    /// Attach a managed policy by ARN (or ARN token)
    pub fn with_managed_policy_arn(mut self, arn: Value) -> Self {
        self.managed_policies.push(arn);
        self
    }

    /// Append a statement to the trust policy
    pub fn with_trust_statement(mut self, statement: PolicyStatement) -> Self {
        self.trust.push(statement);
        self
    }

    /// Append a statement to the role's default policy
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Set the role description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Trust policy document
    pub fn trust_policy(&self) -> PolicyDocument {
        let mut document = PolicyDocument::new();
        if let Some(principal) = &self.assumed_by {
            document.push(
                PolicyStatement::allow()
                    .with_actions(["sts:AssumeRole"])
                    .with_principal(principal.clone()),
            );
        }
        for statement in &self.trust {
            document.push(statement.clone());
        }
        document
    }

    /// Add the role (and default policy) to `scope`
    pub fn declare(self, scope: &mut Scope<'_>) -> Result<RoleRef> {
        let trust = self.trust_policy();
        if trust.is_empty() {
            return Err(Error::validation_for(
                scope.group(),
                format!("role {} trusts nobody", self.local),
            ));
        }
        let role_id = scope.id(&self.local)?;
        let mut role = Resource::new(ROLE_TYPE, role_id.clone())
            .with_property("AssumeRolePolicyDocument", trust.to_value());
        if !self.managed_policies.is_empty() {
            role = role.with_property("ManagedPolicyArns", Value::Array(self.managed_policies));
        }
        if let Some(description) = &self.description {
            role = role.with_property("Description", json!(description));
        }
        scope.add(role)?;

        let policy = if self.statements.is_empty() {
            None
        } else {
            let policy_id = scope.id(&format!("{}DefaultPolicy", self.local))?;
            scope.add(
                Resource::new(POLICY_TYPE, policy_id.clone())
                    .with_property("PolicyName", json!(policy_id.as_str()))
                    .with_property("PolicyDocument", self.statements.to_value())
                    .with_property("Roles", json!([token::reference(&role_id)])),
            )?;
            Some(policy_id)
        };

        Ok(RoleRef {
            role: role_id,
            policy,
        })
    }
}

/// Declare a customer managed policy named `local` in `scope`
pub fn declare_managed_policy(
    scope: &mut Scope<'_>,
    local: &str,
    document: &PolicyDocument,
) -> Result<LogicalId> {
    let id = scope.id(local)?;
    scope.add(
        Resource::new(MANAGED_POLICY_TYPE, id.clone())
            .with_property("PolicyDocument", document.to_value()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceGraph;

    #[test]
    fn test_statement_renders_policy_language() {
        let statement = PolicyStatement::allow()
            .with_sid("S3ListPermission")
            .with_actions(["s3:ListBucket", "s3:GetBucketLocation"])
            .with_resource("arn:aws:s3:::*");
        assert_eq!(
            statement.to_value(),
            json!({
                "Sid": "S3ListPermission",
                "Effect": "Allow",
                "Action": ["s3:ListBucket", "s3:GetBucketLocation"],
                "Resource": ["arn:aws:s3:::*"]
            })
        );
    }

    #[test]
    fn test_conditions_merge_per_operator() {
        let statement = PolicyStatement::allow()
            .with_actions(["ec2:CreateTags"])
            .with_condition("StringEquals", "a", json!("1"))
            .with_condition("StringEquals", "b", json!("2"))
            .with_condition("StringLike", "c", json!("x*"));
        let value = statement.to_value();
        assert_eq!(
            value["Condition"],
            json!({ "StringEquals": { "a": "1", "b": "2" }, "StringLike": { "c": "x*" } })
        );
    }

    #[test]
    fn test_document_carries_version() {
        let document = PolicyDocument::new().with_statement(PolicyStatement::deny().with_actions(["*"]));
        let value = document.to_value();
        assert_eq!(value["Version"], json!(POLICY_VERSION));
        assert_eq!(value["Statement"][0]["Effect"], json!("Deny"));
    }

    #[test]
    fn test_role_builder_declares_role_and_default_policy() {
        let mut graph = ResourceGraph::new();
        let role = {
            let mut scope = graph.scope("Studio");
            RoleBuilder::new("ServiceRole", Principal::service("elasticmapreduce.amazonaws.com"))
                .with_managed_policy("AmazonS3FullAccess")
                .with_statement(
                    PolicyStatement::allow()
                        .with_actions(["ec2:DescribeVpcs"])
                        .with_resource("*"),
                )
                .declare(&mut scope)
                .expect("declare role")
        };

        assert_eq!(role.role.as_str(), "StudioServiceRole");
        let policy_id = role.policy.clone().expect("default policy declared");
        assert_eq!(policy_id.as_str(), "StudioServiceRoleDefaultPolicy");

        let rendered = graph.get(&role.role).expect("role in graph");
        assert_eq!(rendered.resource_type, ROLE_TYPE);
        assert_eq!(
            rendered.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"],
            json!({ "Service": "elasticmapreduce.amazonaws.com" })
        );
        assert_eq!(
            rendered.properties["ManagedPolicyArns"][0],
            token::managed_policy_arn("AmazonS3FullAccess")
        );

        let policy = graph.get(&policy_id).expect("policy in graph");
        assert_eq!(policy.properties["Roles"], json!([{ "Ref": "StudioServiceRole" }]));
        assert!(graph.dependencies_of(&policy_id).contains(&role.role));
        assert_eq!(role.arn(), json!({ "Fn::GetAtt": ["StudioServiceRole", "Arn"] }));
    }

    #[test]
    fn test_role_without_statements_has_no_policy() {
        let mut graph = ResourceGraph::new();
        let mut scope = graph.scope("Compute");
        let role = RoleBuilder::new("ClusterRole", Principal::service("eks.amazonaws.com"))
            .declare(&mut scope)
            .expect("declare role");
        assert!(role.policy.is_none());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_trust_statements_follow_the_service_principal() {
        let builder = RoleBuilder::new("Job", Principal::service("ec2.amazonaws.com"))
            .with_trust_statement(
                PolicyStatement::allow()
                    .with_actions(["sts:AssumeRoleWithWebIdentity"])
                    .with_principal(Principal::Federated(json!({ "Ref": "Oidc" }))),
            );
        let trust = builder.trust_policy();
        assert_eq!(trust.statements().len(), 2);
        assert_eq!(trust.statements()[1].actions(), ["sts:AssumeRoleWithWebIdentity"]);
    }

    #[test]
    fn test_trusting_role_needs_a_trust_statement() {
        let mut graph = ResourceGraph::new();
        let mut scope = graph.scope("Compute");
        assert!(RoleBuilder::trusting("Empty").declare(&mut scope).is_err());

        let role = RoleBuilder::trusting("Controller")
            .with_trust_statement(
                PolicyStatement::allow()
                    .with_actions(["sts:AssumeRoleWithWebIdentity"])
                    .with_principal(Principal::Federated(json!("arn:aws:iam::1:oidc-provider/x"))),
            )
            .declare(&mut scope)
            .expect("declare role");
        let trust = &graph.get(&role.role).expect("role").properties["AssumeRolePolicyDocument"];
        assert_eq!(trust["Statement"].as_array().expect("statements").len(), 1);
    }
}
