//! Parameter store lookups
//!
//! The endpoint declaration needs the domain name and hosted zone id, which
//! live in a process-wide parameter store. A [`ParameterStore`] either knows
//! the value now ([`ParameterValue::Literal`]) or defers it to apply time, in
//! which case the template gets an SSM-backed parameter.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::graph::{Scope, TemplateParameter};
use crate::id::{pascal_case, LogicalId};
use crate::{Error, Result};

/// Parameter path of the endpoint's domain name
pub const DOMAIN_PATH: &str = "/Main/Domain";

/// Parameter path of the hosted zone id used for certificate validation
pub const ZONE_ID_PATH: &str = "/Main/ZONE_ID";

/// Result of a parameter lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterValue {
    /// Known at assembly time
    Literal(String),
    /// Resolved by the provisioning engine from the parameter store at `path`
    DeployTime {
        /// Parameter path
        path: String,
    },
}

impl ParameterValue {
    /// Property value for this parameter.
    ///
    /// Deploy-time values declare (or reuse) a template parameter named after
    /// the path, so every scope reading the same path shares one parameter.
    pub fn resolve(&self, scope: &mut Scope<'_>) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(Value::String(value.clone())),
            Self::DeployTime { path } => {
                let name = LogicalId::new(pascal_case(path))?;
                scope.parameter(
                    TemplateParameter::ssm_string(name, path)
                        .with_description(format!("Parameter store value at {path}")),
                )
            }
        }
    }
}

/// Lookup by fixed key path
pub trait ParameterStore {
    /// Value stored at `path`
    fn lookup(&self, path: &str) -> Result<ParameterValue>;
}

/// Defers every lookup to apply time through SSM parameters
#[derive(Clone, Copy, Debug, Default)]
pub struct SsmParameterStore;

impl ParameterStore for SsmParameterStore {
    fn lookup(&self, path: &str) -> Result<ParameterValue> {
        Ok(ParameterValue::DeployTime {
            path: path.to_string(),
        })
    }
}

/// Fixed values, for tests and offline synthesis
#[derive(Clone, Debug, Default)]
pub struct StaticParameterStore {
    values: BTreeMap<String, String>,
}

impl StaticParameterStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.values.insert(path.to_string(), value.to_string());
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, path: &str, value: &str) {
        self.values.insert(path.to_string(), value.to_string());
    }

    /// Whether the store has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterStore for StaticParameterStore {
    fn lookup(&self, path: &str) -> Result<ParameterValue> {
        self.values
            .get(path)
            .map(|v| ParameterValue::Literal(v.clone()))
            .ok_or_else(|| Error::missing_parameter(path))
    }
}

impl<P: ParameterStore + ?Sized> ParameterStore for &P {
    fn lookup(&self, path: &str) -> Result<ParameterValue> {
        (**self).lookup(path)
    }
}

/// Parse a `path=value` pair from the command line
pub fn parse_parameter(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((path, value)) if path.starts_with('/') => Ok((path.to_string(), value.to_string())),
        _ => Err(Error::validation_for(
            "parameters",
            format!("expected /path=value, got {raw}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceGraph;
    use serde_json::json;

    #[test]
    fn test_ssm_store_defers_to_template_parameter() {
        let mut graph = ResourceGraph::new();
        let value = SsmParameterStore
            .lookup(DOMAIN_PATH)
            .expect("lookup never fails");
        let resolved = {
            let mut scope = graph.scope("Endpoint");
            value.resolve(&mut scope).expect("resolve")
        };

        assert_eq!(resolved, json!({ "Ref": "MainDomain" }));
        let parameter = graph.parameters().next().expect("parameter declared");
        assert_eq!(parameter.parameter_type, "AWS::SSM::Parameter::Value<String>");
        assert_eq!(parameter.default.as_deref(), Some(DOMAIN_PATH));
    }

    #[test]
    fn test_same_path_shares_one_parameter() {
        let mut graph = ResourceGraph::new();
        let value = SsmParameterStore.lookup(ZONE_ID_PATH).expect("lookup");
        value
            .resolve(&mut graph.scope("A"))
            .expect("first resolve");
        value
            .resolve(&mut graph.scope("B"))
            .expect("second resolve");
        assert_eq!(graph.parameters().count(), 1);
    }

    #[test]
    fn test_static_store_returns_literals() {
        let store = StaticParameterStore::new().with(DOMAIN_PATH, "example.com");
        assert_eq!(
            store.lookup(DOMAIN_PATH).expect("present"),
            ParameterValue::Literal("example.com".into())
        );
        assert!(matches!(
            store.lookup(ZONE_ID_PATH),
            Err(Error::MissingParameter { ref path }) if path == ZONE_ID_PATH
        ));

        let mut graph = ResourceGraph::new();
        let resolved = store
            .lookup(DOMAIN_PATH)
            .expect("present")
            .resolve(&mut graph.scope("Endpoint"))
            .expect("resolve");
        assert_eq!(resolved, json!("example.com"));
        assert_eq!(graph.parameters().count(), 0);
    }

    #[test]
    fn test_parse_parameter() {
        assert_eq!(
            parse_parameter("/Main/Domain=example.com").expect("valid"),
            ("/Main/Domain".to_string(), "example.com".to_string())
        );
        assert!(parse_parameter("Main/Domain=x").is_err());
        assert!(parse_parameter("/Main/Domain").is_err());
    }
}
