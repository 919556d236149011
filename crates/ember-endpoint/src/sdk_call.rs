//! Cloud API calls executed by the action runner on create and delete

use serde_json::{json, Map, Value};

/// Placeholder the runner replaces with the physical id recorded at create time
pub const PHYSICAL_RESOURCE_ID: &str = "PHYSICAL:RESOURCEID:";

/// How the runner derives the physical id of the custom resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicalResourceId {
    /// Field of the API response
    FromResponse(String),
    /// Fixed value
    Literal(String),
}

impl PhysicalResourceId {
    fn to_value(&self) -> Value {
        match self {
            Self::FromResponse(path) => json!({ "responsePath": path }),
            Self::Literal(id) => json!({ "id": id }),
        }
    }
}

/// One SDK call: `service.action(parameters)`
#[derive(Clone, Debug, PartialEq)]
pub struct SdkCall {
    /// SDK service name, e.g. `EMRcontainers`
    pub service: String,
    /// SDK action name, e.g. `createManagedEndpoint`
    pub action: String,
    /// Call parameters, may contain tokens
    pub parameters: Map<String, Value>,
    /// Physical id of the custom resource after this call
    pub physical_resource_id: Option<PhysicalResourceId>,
}

impl SdkCall {
    /// Call without parameters
    pub fn new(service: &str, action: &str) -> Self {
        Self {
            service: service.to_string(),
            action: action.to_string(),
            parameters: Map::new(),
            physical_resource_id: None,
        }
    }

    /// Set one parameter
    pub fn with_parameter(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    /// Set the physical id source
    pub fn with_physical_resource_id(mut self, id: PhysicalResourceId) -> Self {
        self.physical_resource_id = Some(id);
        self
    }

    /// Parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// IAM action this call needs: `emr-containers:CreateManagedEndpoint`
    pub fn iam_action(&self) -> String {
        let prefix = match self.service.to_ascii_lowercase().as_str() {
            "emrcontainers" => "emr-containers".to_string(),
            other => other.to_string(),
        };
        let mut chars = self.action.chars();
        let action = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        format!("{prefix}:{action}")
    }

    /// Property document read by the action runner
    pub fn to_value(&self) -> Value {
        let mut call = json!({
            "service": self.service,
            "action": self.action,
            "parameters": self.parameters
        });
        if let Some(id) = &self.physical_resource_id {
            call["physicalResourceId"] = id.to_value();
        }
        call
    }
}

/// Whether `value` is the create-time physical id placeholder
pub fn is_physical_resource_id(value: &Value) -> bool {
    value.as_str() == Some(PHYSICAL_RESOURCE_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("EMRcontainers", "createManagedEndpoint", "emr-containers:CreateManagedEndpoint")]
    #[case("EMRcontainers", "deleteManagedEndpoint", "emr-containers:DeleteManagedEndpoint")]
    #[case("S3", "getObject", "s3:GetObject")]
    fn test_iam_action(#[case] service: &str, #[case] action: &str, #[case] expected: &str) {
        assert_eq!(SdkCall::new(service, action).iam_action(), expected);
    }

    #[test]
    fn test_call_document() {
        let call = SdkCall::new("EMRcontainers", "createManagedEndpoint")
            .with_parameter("name", json!("endpoint"))
            .with_physical_resource_id(PhysicalResourceId::FromResponse("id".to_string()));
        assert_eq!(
            call.to_value(),
            json!({
                "service": "EMRcontainers",
                "action": "createManagedEndpoint",
                "parameters": { "name": "endpoint" },
                "physicalResourceId": { "responsePath": "id" }
            })
        );
        assert!(SdkCall::new("S3", "listBuckets")
            .to_value()
            .get("physicalResourceId")
            .is_none());
    }
}
