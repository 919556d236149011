//! Declared resources
//!
//! A [`Resource`] is an untyped provider resource: type name, logical id,
//! property document and explicit must-follow set. Declarations build these
//! with the `with_*` helpers and hand them to a [`crate::graph::Scope`].

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::id::LogicalId;
use crate::token;

/// A provider resource declared in the graph
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    /// Provider resource type (e.g. "AWS::EC2::VPC")
    pub resource_type: String,
    /// Logical id, unique in the graph
    pub id: LogicalId,
    /// Property document (untyped)
    pub properties: Value,
    /// Explicit must-follow edges declared for this resource
    pub depends_on: BTreeSet<LogicalId>,
    /// Declaration group this resource belongs to (set by the scope)
    pub group: String,
}

impl Resource {
    /// Create a resource with an empty property document
    pub fn new(resource_type: impl Into<String>, id: LogicalId) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            properties: Value::Object(Map::new()),
            depends_on: BTreeSet::new(),
            group: String::new(),
        }
    }

    /// Replace the property document
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property, turning the document into an object if needed
    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        if !self.properties.is_object() {
            self.properties = Value::Object(Map::new());
        }
        if let Value::Object(ref mut map) = self.properties {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Add an explicit must-follow edge
    pub fn with_dependency(mut self, dependency: &LogicalId) -> Self {
        self.depends_on.insert(dependency.clone());
        self
    }

    /// `Ref` to this resource
    pub fn reference(&self) -> Value {
        token::reference(&self.id)
    }

    /// `Fn::GetAtt` of an attribute of this resource
    pub fn attribute(&self, name: &str) -> Value {
        token::attribute(&self.id, name)
    }

    /// Property value by key, if the document is an object
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Names referenced from the property document
    pub fn referenced_names(&self) -> BTreeSet<String> {
        token::referenced_names(&self.properties)
    }
}
