//! Resource graph for ember declarations
//!
//! Nodes are declared resources; edges are the union of
//! - value edges: a property refers to another resource (`Ref`, `Fn::GetAtt`, `Fn::Sub`)
//! - explicit edges: a resource was told to follow another one
//! - group edges: every resource of one declaration group follows every
//!   resource of another group
//!
//! The graph is built once, synchronously, and then rendered for the external
//! provisioning engine. `apply_order` exposes the order that engine is expected
//! to honour so it can be inspected and tested.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::id::LogicalId;
use crate::resource::Resource;
use crate::{token, Error, Result};

/// A template parameter resolved by the provisioning engine at apply time
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateParameter {
    /// Parameter name, shares the logical id namespace with resources
    pub name: LogicalId,
    /// Parameter type (e.g. "String", "AWS::SSM::Parameter::Value<String>")
    pub parameter_type: String,
    /// Default value
    pub default: Option<String>,
    /// Human readable description
    pub description: Option<String>,
}

impl TemplateParameter {
    /// Create a plain string parameter
    pub fn string(name: LogicalId) -> Self {
        Self {
            name,
            parameter_type: "String".to_string(),
            default: None,
            description: None,
        }
    }

    /// Create a parameter resolved from an SSM string parameter at `path`
    pub fn ssm_string(name: LogicalId, path: &str) -> Self {
        Self {
            name,
            parameter_type: "AWS::SSM::Parameter::Value<String>".to_string(),
            default: Some(path.to_string()),
            description: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named value exported from the applied template
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateOutput {
    /// Output name
    pub name: LogicalId,
    /// Output value, usually a token
    pub value: Value,
    /// Human readable description
    pub description: Option<String>,
}

/// Directed graph of declared resources
#[derive(Debug, Default)]
pub struct ResourceGraph {
    description: Option<String>,
    resources: Vec<Resource>,
    index: BTreeMap<LogicalId, usize>,
    parameters: BTreeMap<LogicalId, TemplateParameter>,
    outputs: BTreeMap<LogicalId, TemplateOutput>,
    /// (dependent group, dependency group)
    group_edges: BTreeSet<(String, String)>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the template description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Template description, if set
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Open a declaration scope whose logical ids are prefixed with `group`
    pub fn scope(&mut self, group: &str) -> Scope<'_> {
        Scope {
            graph: self,
            group: group.to_string(),
        }
    }

    /// Add a resource to `group`.
    ///
    /// Fails if the logical id is already used by a resource or parameter.
    pub fn add(&mut self, group: &str, mut resource: Resource) -> Result<LogicalId> {
        if self.index.contains_key(&resource.id) || self.parameters.contains_key(&resource.id) {
            return Err(Error::duplicate_id(resource.id.as_str(), group));
        }
        resource.group = group.to_string();
        let id = resource.id.clone();
        debug!(group, id = %id, resource_type = %resource.resource_type, "declared resource");
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(id)
    }

    /// Add a template parameter and return a `Ref` to it.
    ///
    /// Declaring an identical parameter twice is allowed and returns the same
    /// reference; a different parameter under the same name is a collision.
    pub fn add_parameter(&mut self, parameter: TemplateParameter) -> Result<Value> {
        let reference = token::reference(&parameter.name);
        if self.index.contains_key(&parameter.name) {
            return Err(Error::duplicate_id(parameter.name.as_str(), "Parameters"));
        }
        match self.parameters.get(&parameter.name) {
            Some(existing) if *existing == parameter => Ok(reference),
            Some(_) => Err(Error::duplicate_id(parameter.name.as_str(), "Parameters")),
            None => {
                self.parameters.insert(parameter.name.clone(), parameter);
                Ok(reference)
            }
        }
    }

    /// Add a template output
    pub fn add_output(&mut self, output: TemplateOutput) -> Result<()> {
        if self.outputs.contains_key(&output.name) {
            return Err(Error::duplicate_id(output.name.as_str(), "Outputs"));
        }
        self.outputs.insert(output.name.clone(), output);
        Ok(())
    }

    /// Declare that `dependent` must be applied after `dependency`
    pub fn depend(&mut self, dependent: &LogicalId, dependency: &LogicalId) -> Result<()> {
        if dependent == dependency {
            return Err(Error::DependencyCycle {
                path: vec![dependent.to_string(), dependency.to_string()],
            });
        }
        if !self.index.contains_key(dependency) {
            return Err(Error::unknown_reference(
                dependent.as_str(),
                dependency.as_str(),
            ));
        }
        let slot = *self
            .index
            .get(dependent)
            .ok_or_else(|| Error::unknown_reference(dependency.as_str(), dependent.as_str()))?;
        self.resources[slot].depends_on.insert(dependency.clone());
        Ok(())
    }

    /// Declare that every resource of group `dependent` follows every resource of group `dependency`
    pub fn depend_group(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        if dependent == dependency {
            return Err(Error::validation_for(
                dependent,
                "a group cannot depend on itself",
            ));
        }
        for group in [dependent, dependency] {
            if !self.resources.iter().any(|r| r.group == group) {
                return Err(Error::validation_for(
                    group,
                    "group has no declared resources",
                ));
            }
        }
        debug!(dependent, dependency, "declared group dependency");
        self.group_edges
            .insert((dependent.to_string(), dependency.to_string()));
        Ok(())
    }

    /// Resource by logical id
    pub fn get(&self, id: &LogicalId) -> Option<&Resource> {
        self.index.get(id).map(|&slot| &self.resources[slot])
    }

    /// Resource by logical id string
    pub fn get_str(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&slot| &self.resources[slot])
    }

    /// All resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Resources of one group in declaration order
    pub fn resources_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.iter().filter(move |r| r.group == group)
    }

    /// Resources of a given provider type in declaration order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    /// Template parameters
    pub fn parameters(&self) -> impl Iterator<Item = &TemplateParameter> {
        self.parameters.values()
    }

    /// Template outputs
    pub fn outputs(&self) -> impl Iterator<Item = &TemplateOutput> {
        self.outputs.values()
    }

    /// Declared group edges as (dependent, dependency)
    pub fn group_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.group_edges
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Groups in first-declaration order
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.resources
            .iter()
            .filter(|r| seen.insert(r.group.as_str()))
            .map(|r| r.group.as_str())
            .collect()
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resource has been declared
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources `id` consumes outputs of
    pub fn value_dependencies(&self, id: &LogicalId) -> BTreeSet<LogicalId> {
        let Some(resource) = self.get(id) else {
            return BTreeSet::new();
        };
        resource
            .referenced_names()
            .into_iter()
            .filter_map(|name| self.get_str(&name).map(|r| r.id.clone()))
            .filter(|dep| dep != id)
            .collect()
    }

    /// Explicit must-follow edges of `id`, including edges derived from group dependencies
    pub fn explicit_dependencies(&self, id: &LogicalId) -> BTreeSet<LogicalId> {
        let Some(resource) = self.get(id) else {
            return BTreeSet::new();
        };
        let terminals = self.group_terminals_for(&resource.group);
        let mut deps = resource.depends_on.clone();
        deps.extend(self.group_dependencies(resource, &terminals));
        deps
    }

    /// Union of value and explicit edges of `id`
    pub fn dependencies_of(&self, id: &LogicalId) -> BTreeSet<LogicalId> {
        let mut deps = self.value_dependencies(id);
        deps.extend(self.explicit_dependencies(id));
        deps
    }

    /// Dependencies that stay inside the resource's own declaration
    fn local_dependencies(&self, resource: &Resource) -> BTreeSet<LogicalId> {
        let mut deps = self.value_dependencies(&resource.id);
        deps.extend(resource.depends_on.iter().cloned());
        deps
    }

    /// Terminals of every group that `group` depends on
    fn group_terminals_for(&self, group: &str) -> BTreeMap<&str, Vec<LogicalId>> {
        self.group_edges
            .iter()
            .filter(|(dependent, _)| dependent == group)
            .map(|(_, dependency)| (dependency.as_str(), self.terminals(dependency)))
            .collect()
    }

    /// Terminals of every group some other group depends on
    fn all_group_terminals(&self) -> BTreeMap<&str, Vec<LogicalId>> {
        self.group_edges
            .iter()
            .map(|(_, dependency)| dependency.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|dependency| (dependency, self.terminals(dependency)))
            .collect()
    }

    /// Group edges expanded for one resource.
    ///
    /// Only roots of the dependent group (no dependency inside their own group)
    /// receive edges, and only to terminals of the dependency group (nothing in
    /// that group follows them). Every other pair is implied transitively.
    fn group_dependencies(
        &self,
        resource: &Resource,
        terminals: &BTreeMap<&str, Vec<LogicalId>>,
    ) -> BTreeSet<LogicalId> {
        let mut deps = BTreeSet::new();
        let dependency_groups: Vec<&str> = self
            .group_edges
            .iter()
            .filter(|(dependent, _)| *dependent == resource.group)
            .map(|(_, dependency)| dependency.as_str())
            .collect();
        if dependency_groups.is_empty() {
            return deps;
        }
        let is_root = self
            .local_dependencies(resource)
            .iter()
            .filter_map(|dep| self.get(dep))
            .all(|dep| dep.group != resource.group);
        if !is_root {
            return deps;
        }
        for group in dependency_groups {
            if let Some(ids) = terminals.get(group) {
                deps.extend(ids.iter().cloned());
            }
        }
        deps
    }

    /// Resources of `group` that no other resource of `group` depends on
    fn terminals(&self, group: &str) -> Vec<LogicalId> {
        let members: Vec<&Resource> = self.resources_in(group).collect();
        let depended_on: BTreeSet<LogicalId> = members
            .iter()
            .flat_map(|r| self.local_dependencies(r))
            .collect();
        members
            .into_iter()
            .filter(|r| !depended_on.contains(&r.id))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Check references, explicit edges and acyclicity
    pub fn validate(&self) -> Result<()> {
        for resource in &self.resources {
            for name in resource.referenced_names() {
                if !self.is_declared(&name) {
                    return Err(Error::unknown_reference(resource.id.as_str(), name));
                }
            }
            for dep in &resource.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(Error::unknown_reference(resource.id.as_str(), dep.as_str()));
                }
            }
        }
        for output in self.outputs.values() {
            for name in token::referenced_names(&output.value) {
                if !self.is_declared(&name) {
                    return Err(Error::unknown_reference(output.name.as_str(), name));
                }
            }
        }
        self.apply_order().map(|_| ())
    }

    fn is_declared(&self, name: &str) -> bool {
        self.index.contains_key(name) || self.parameters.contains_key(name)
    }

    /// Topological order of all resources, stable with respect to declaration order
    pub fn apply_order(&self) -> Result<Vec<LogicalId>> {
        let terminals = self.all_group_terminals();
        let deps: Vec<BTreeSet<usize>> = self
            .resources
            .iter()
            .map(|r| {
                let mut all = self.local_dependencies(r);
                all.extend(self.group_dependencies(r, &terminals));
                all.iter()
                    .filter_map(|d| self.index.get(d).copied())
                    .collect()
            })
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.resources.len()];
        let mut pending: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
        for (slot, slot_deps) in deps.iter().enumerate() {
            for &dep in slot_deps {
                dependents[dep].push(slot);
            }
        }

        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(slot, _)| slot)
            .collect();
        let mut order = Vec::with_capacity(self.resources.len());
        while let Some(slot) = ready.pop_first() {
            order.push(self.resources[slot].id.clone());
            for &next in &dependents[slot] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() == self.resources.len() {
            return Ok(order);
        }
        let stuck: Vec<usize> = (0..self.resources.len())
            .filter(|&slot| pending[slot] > 0)
            .collect();
        Err(Error::DependencyCycle {
            path: self.find_cycle(&deps, &stuck),
        })
    }

    /// Walk dependency edges from a stuck node until a node repeats
    fn find_cycle(&self, deps: &[BTreeSet<usize>], stuck: &[usize]) -> Vec<String> {
        let stuck_set: BTreeSet<usize> = stuck.iter().copied().collect();
        let Some(&start) = stuck.first() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&next) = deps[current].iter().find(|d| stuck_set.contains(*d)) else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&slot| self.resources[slot].id.to_string())
                    .collect();
                cycle.push(self.resources[next].id.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter()
            .map(|&slot| self.resources[slot].id.to_string())
            .collect()
    }
}

/// Declaration scope: a group name plus mutable access to the graph
pub struct Scope<'g> {
    graph: &'g mut ResourceGraph,
    group: String,
}

impl Scope<'_> {
    /// Group name of this scope
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Logical id for a resource local to this scope (`group` + `local`)
    pub fn id(&self, local: &str) -> Result<LogicalId> {
        LogicalId::new(format!("{}{}", self.group, local))
    }

    /// Add a resource under this scope's group
    pub fn add(&mut self, resource: Resource) -> Result<LogicalId> {
        self.graph.add(&self.group, resource)
    }

    /// Declare an explicit must-follow edge
    pub fn depend(&mut self, dependent: &LogicalId, dependency: &LogicalId) -> Result<()> {
        self.graph.depend(dependent, dependency)
    }

    /// Add a template parameter and return a `Ref` to it
    pub fn parameter(&mut self, parameter: TemplateParameter) -> Result<Value> {
        self.graph.add_parameter(parameter)
    }

    /// Add a template output named `group` + `local`
    pub fn output(&mut self, local: &str, value: Value, description: &str) -> Result<()> {
        let name = self.id(local)?;
        self.graph.add_output(TemplateOutput {
            name,
            value,
            description: Some(description.to_string()),
        })
    }

    /// Read access to the whole graph
    pub fn graph(&self) -> &ResourceGraph {
        self.graph
    }

    /// Resource by logical id
    pub fn get(&self, id: &LogicalId) -> Option<&Resource> {
        self.graph.get(id)
    }
}
