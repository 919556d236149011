//! Template rendering
//!
//! Turns a validated [`ResourceGraph`] into the document handed to the
//! provisioning engine. The engine orders by value references it finds in
//! `Properties` and by `DependsOn`, so only explicit and group-derived edges are
//! written to `DependsOn`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::ResourceGraph;
use crate::{Error, Result};

/// Template format version understood by the provisioning engine
pub const FORMAT_VERSION: &str = "2010-09-09";

/// Serialization format of a rendered template
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(Error::serialization(format!(
                "unsupported output format {other}"
            ))),
        }
    }
}

/// A rendered template
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Always [`FORMAT_VERSION`]
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    /// Template description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameters by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterEntry>,
    /// Resources by logical id
    pub resources: BTreeMap<String, ResourceEntry>,
    /// Outputs by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputEntry>,
}

/// One rendered parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterEntry {
    /// Parameter type
    #[serde(rename = "Type")]
    pub parameter_type: String,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One rendered resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceEntry {
    /// Resource type
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Property document
    #[serde(default, skip_serializing_if = "is_empty_document")]
    pub properties: Value,
    /// Explicit and group-derived must-follow edges, sorted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// One rendered output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputEntry {
    /// Output value
    pub value: Value,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl Template {
    /// Validate `graph` and render it
    pub fn from_graph(graph: &ResourceGraph) -> Result<Self> {
        graph.validate()?;

        let parameters = graph
            .parameters()
            .map(|p| {
                (
                    p.name.to_string(),
                    ParameterEntry {
                        parameter_type: p.parameter_type.clone(),
                        default: p.default.clone(),
                        description: p.description.clone(),
                    },
                )
            })
            .collect();

        let resources = graph
            .resources()
            .map(|r| {
                let depends_on = graph
                    .explicit_dependencies(&r.id)
                    .into_iter()
                    .map(|d| d.to_string())
                    .collect();
                (
                    r.id.to_string(),
                    ResourceEntry {
                        resource_type: r.resource_type.clone(),
                        properties: r.properties.clone(),
                        depends_on,
                    },
                )
            })
            .collect();

        let outputs = graph
            .outputs()
            .map(|o| {
                (
                    o.name.to_string(),
                    OutputEntry {
                        value: o.value.clone(),
                        description: o.description.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            description: graph.description().map(str::to_string),
            parameters,
            resources,
            outputs,
        })
    }

    /// Rendered resource by logical id
    pub fn resource(&self, id: &str) -> Option<&ResourceEntry> {
        self.resources.get(id)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Serialize in the requested format
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json(),
            OutputFormat::Yaml => self.to_yaml(),
        }
    }
}
