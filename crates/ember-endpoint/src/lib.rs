//! Managed endpoint of the analytics virtual cluster
//!
//! Managed endpoints have no native resource type. A custom resource served
//! by a dedicated action runner calls `createManagedEndpoint` on create and
//! `deleteManagedEndpoint` on delete. The delete call addresses the endpoint
//! by the id the create call returned, which the runner records as the
//! resource's physical id. An update creates a fresh endpoint; the new
//! physical id makes the provisioning engine delete the old one.

#![deny(missing_docs)]

pub mod certificate;
pub mod runner;
pub mod sdk_call;

pub use certificate::declare_certificate;
pub use runner::{declare_action_runner, ActionRunner};
pub use sdk_call::{is_physical_resource_id, PhysicalResourceId, SdkCall, PHYSICAL_RESOURCE_ID};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use ember_common::parameters::{ParameterStore, DOMAIN_PATH, ZONE_ID_PATH};
use ember_common::{token, LogicalId, Resource, Result, Scope};

/// Resource type of the managed endpoint custom resource
pub const MANAGED_ENDPOINT_TYPE: &str = "Custom::ManagedEndpoint";

const SERVICE: &str = "EMRcontainers";

/// Endpoint declaration inputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSpec {
    /// Endpoint name
    pub name: String,
    /// Release label of the endpoint's engine
    pub release_label: String,
    /// Endpoint type
    pub endpoint_type: String,
    /// Name of the action runner function
    pub function_name: String,
    /// Parameter path of the domain name
    pub domain_path: String,
    /// Parameter path of the hosted zone id
    pub zone_id_path: String,
}

impl Default for EndpointSpec {
    fn default() -> Self {
        Self {
            name: "emr-endpoint-eks-spark".to_string(),
            release_label: "emr-6.2.0-latest".to_string(),
            endpoint_type: "JUPYTER_ENTERPRISE_GATEWAY".to_string(),
            function_name: "CreateEpFn".to_string(),
            domain_path: DOMAIN_PATH.to_string(),
            zone_id_path: ZONE_ID_PATH.to_string(),
        }
    }
}

/// Tokens of the compute declaration the endpoint attaches to
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointTarget {
    /// Virtual cluster id
    pub virtual_cluster_id: Value,
    /// Job execution role ARN
    pub execution_role_arn: Value,
}

/// What the endpoint declaration exposes
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointRef {
    /// Certificate
    pub certificate: LogicalId,
    /// Action runner
    pub runner: ActionRunner,
    /// Custom resource owning the endpoint
    pub endpoint: LogicalId,
    /// Call made on create
    pub create: SdkCall,
    /// Call made on update
    pub update: SdkCall,
    /// Call made on delete
    pub delete: SdkCall,
}

impl EndpointRef {
    /// Managed endpoint id token (the custom resource's physical id)
    pub fn endpoint_id(&self) -> Value {
        token::reference(&self.endpoint)
    }
}

/// Create, update and delete calls for an endpoint on `target` secured by `certificate`.
///
/// Managed endpoints cannot be modified in place, so the update call is the
/// create call: it yields a new endpoint id, and the replaced endpoint is torn
/// down through the delete call under its old id.
pub fn endpoint_calls(
    spec: &EndpointSpec,
    target: &EndpointTarget,
    certificate: &LogicalId,
) -> (SdkCall, SdkCall, SdkCall) {
    let create = SdkCall::new(SERVICE, "createManagedEndpoint")
        .with_parameter("certificateArn", token::reference(certificate))
        .with_parameter("executionRoleArn", target.execution_role_arn.clone())
        .with_parameter("name", json!(spec.name))
        .with_parameter("releaseLabel", json!(spec.release_label))
        .with_parameter("type", json!(spec.endpoint_type))
        .with_parameter("virtualClusterId", target.virtual_cluster_id.clone())
        .with_physical_resource_id(PhysicalResourceId::FromResponse("id".to_string()));
    let delete = SdkCall::new(SERVICE, "deleteManagedEndpoint")
        .with_parameter("id", json!(PHYSICAL_RESOURCE_ID))
        .with_parameter("virtualClusterId", target.virtual_cluster_id.clone());
    let update = create.clone();
    (create, update, delete)
}

/// Declare the endpoint in `scope`, reading the domain and zone from `parameters`
pub fn declare(
    scope: &mut Scope<'_>,
    parameters: &dyn ParameterStore,
    spec: &EndpointSpec,
    target: &EndpointTarget,
) -> Result<EndpointRef> {
    info!(group = scope.group(), name = %spec.name, release = %spec.release_label, "declaring managed endpoint");
    let domain = parameters.lookup(&spec.domain_path)?.resolve(scope)?;
    let zone_id = parameters.lookup(&spec.zone_id_path)?.resolve(scope)?;
    let certificate = declare_certificate(scope, &domain, &zone_id)?;

    let (create, update, delete) = endpoint_calls(spec, target, &certificate);
    let runner =
        declare_action_runner(scope, &spec.function_name, &[&create, &update, &delete])?;

    let endpoint = scope.add(
        Resource::new(MANAGED_ENDPOINT_TYPE, scope.id("ManagedEndpoint")?).with_properties(json!({
            "ServiceToken": runner.service_token(),
            "Create": create.to_value(),
            "Update": update.to_value(),
            "Delete": delete.to_value()
        })),
    )?;
    scope.depend(&endpoint, &certificate)?;
    if let Some(policy) = &runner.role.policy {
        scope.depend(&endpoint, policy)?;
    }
    debug!(endpoint = %endpoint, certificate = %certificate, "declared managed endpoint");

    Ok(EndpointRef {
        certificate,
        runner,
        endpoint,
        create,
        update,
        delete,
    })
}
