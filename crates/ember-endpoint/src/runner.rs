//! Function that executes SDK calls for custom resources
//!
//! The function code is published out of band; the template takes its
//! location as parameters. Its role may perform exactly the IAM actions of the
//! calls it serves.

use serde_json::json;

use ember_common::iam::{PolicyStatement, Principal, RoleBuilder, RoleRef};
use ember_common::{token, LogicalId, Resource, Result, Scope, TemplateParameter};

use crate::sdk_call::SdkCall;

/// Template parameter naming the bucket holding the runner code
pub const CODE_BUCKET_PARAMETER: &str = "ActionRunnerCodeBucket";

/// Template parameter naming the runner code object key
pub const CODE_KEY_PARAMETER: &str = "ActionRunnerCodeKey";

const RUNTIME: &str = "nodejs18.x";
const TIMEOUT_SECONDS: u32 = 120;

/// A declared runner
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRunner {
    /// Execution role of the function
    pub role: RoleRef,
    /// The function
    pub function: LogicalId,
}

impl ActionRunner {
    /// Service token of custom resources served by this runner
    pub fn service_token(&self) -> serde_json::Value {
        token::attribute(&self.function, "Arn")
    }
}

/// Declare a runner named `function_name` allowed to perform `calls`
pub fn declare_action_runner(
    scope: &mut Scope<'_>,
    function_name: &str,
    calls: &[&SdkCall],
) -> Result<ActionRunner> {
    let bucket = scope.parameter(
        TemplateParameter::string(LogicalId::new(CODE_BUCKET_PARAMETER)?)
            .with_description("S3 bucket holding the action runner code"),
    )?;
    let key = scope.parameter(
        TemplateParameter::string(LogicalId::new(CODE_KEY_PARAMETER)?)
            .with_description("S3 key of the action runner code bundle"),
    )?;

    let mut actions: Vec<String> = calls.iter().map(|call| call.iam_action()).collect();
    actions.sort();
    actions.dedup();
    let role = RoleBuilder::new("RunnerRole", Principal::service("lambda.amazonaws.com"))
        .with_managed_policy("service-role/AWSLambdaBasicExecutionRole")
        .with_statement(PolicyStatement::allow().with_actions(actions).with_resource("*"))
        .declare(scope)?;

    let function = scope.add(
        Resource::new("AWS::Lambda::Function", scope.id("RunnerFunction")?).with_properties(json!({
            "FunctionName": function_name,
            "Handler": "index.handler",
            "Runtime": RUNTIME,
            "Timeout": TIMEOUT_SECONDS,
            "Role": role.arn(),
            "Code": { "S3Bucket": bucket, "S3Key": key }
        })),
    )?;
    // the function must not run before its permissions exist
    if let Some(policy) = &role.policy {
        scope.depend(&function, policy)?;
    }

    Ok(ActionRunner { role, function })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::ResourceGraph;

    #[test]
    fn test_runner_policy_covers_exactly_the_calls() {
        let create = SdkCall::new("EMRcontainers", "createManagedEndpoint");
        let delete = SdkCall::new("EMRcontainers", "deleteManagedEndpoint");
        let mut graph = ResourceGraph::new();
        let runner = declare_action_runner(&mut graph.scope("Endpoint"), "CreateEpFn", &[&create, &delete])
            .expect("runner");

        let policy_id = runner.role.policy.clone().expect("policy");
        let policy = graph.get(&policy_id).expect("policy");
        assert_eq!(
            policy.properties["PolicyDocument"]["Statement"],
            json!([{
                "Effect": "Allow",
                "Action": [
                    "emr-containers:CreateManagedEndpoint",
                    "emr-containers:DeleteManagedEndpoint"
                ],
                "Resource": ["*"]
            }])
        );

        let function = graph.get(&runner.function).expect("function");
        assert_eq!(function.properties["FunctionName"], json!("CreateEpFn"));
        assert!(graph.explicit_dependencies(&runner.function).contains(&policy_id));
        assert!(graph
            .parameters()
            .any(|p| p.name.as_str() == CODE_BUCKET_PARAMETER));
        graph.validate().expect("graph is consistent");
    }
}
