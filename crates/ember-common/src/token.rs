//! Intrinsic references between declared resources
//!
//! Property values that are only known at apply time (a subnet id, a role ARN,
//! the cluster's OIDC issuer) are written as intrinsic function objects. The
//! graph scans properties for these objects to derive value-dependency edges,
//! so a reference is also an ordering constraint.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::id::LogicalId;

/// Pseudo parameter: account the template is applied in
pub const ACCOUNT_ID: &str = "AWS::AccountId";

/// Pseudo parameter: region the template is applied in
pub const REGION: &str = "AWS::Region";

/// Pseudo parameter: partition (aws, aws-cn, aws-us-gov)
pub const PARTITION: &str = "AWS::Partition";

/// Prefix shared by all pseudo parameters
const PSEUDO_PREFIX: &str = "AWS::";

/// `{"Ref": id}`: physical id of a resource or value of a parameter
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

/// `{"Ref": "AWS::..."}`: value of a pseudo parameter
pub fn pseudo(name: &str) -> Value {
    json!({ "Ref": name })
}

/// `{"Fn::GetAtt": [id, attribute]}`: attribute of a declared resource
pub fn attribute(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::Sub": template}`: string interpolation of `${Name}` placeholders
pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

/// `{"Fn::Join": [separator, parts]}`
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// `{"Fn::Select": [index, list]}`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::Split": [delimiter, source]}`
pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

/// `{"Fn::GetAZs": ""}`: availability zones of the current region
pub fn availability_zones() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// ARN of an AWS managed IAM policy in the current partition
pub fn managed_policy_arn(name: &str) -> Value {
    sub(format!("arn:${{{PARTITION}}}:iam::aws:policy/{name}"))
}

/// Whether a value contains any intrinsic function
pub fn is_unresolved(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.keys().any(|k| k == "Ref" || k.starts_with("Fn::")) || map.values().any(is_unresolved)
        }
        Value::Array(items) => items.iter().any(is_unresolved),
        _ => false,
    }
}

/// Collect every logical id or parameter name a value refers to.
///
/// Pseudo parameters (`AWS::*`) are skipped. `Fn::Sub` templates are parsed
/// for `${Name}` and `${Name.Attribute}`; `${!Literal}` escapes and names
/// bound by the variable map of the two-argument form are not references.
pub fn referenced_names(value: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect(value, &mut names);
    names
}

fn collect(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                insert_name(target, names);
            }
            if let Some(get_att) = map.get("Fn::GetAtt") {
                match get_att {
                    Value::Array(parts) => {
                        if let Some(Value::String(target)) = parts.first() {
                            insert_name(target, names);
                        }
                    }
                    Value::String(dotted) => {
                        if let Some((target, _)) = dotted.split_once('.') {
                            insert_name(target, names);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(template) = map.get("Fn::Sub") {
                collect_sub(template, names);
            }
            for (key, nested) in map {
                if key != "Fn::Sub" {
                    collect(nested, names);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect(item, names)),
        _ => {}
    }
}

fn collect_sub(template: &Value, names: &mut BTreeSet<String>) {
    match template {
        Value::String(text) => {
            for placeholder in placeholders(text) {
                insert_name(placeholder, names);
            }
        }
        Value::Array(parts) => {
            let (Some(Value::String(text)), variables) = (parts.first(), parts.get(1)) else {
                return;
            };
            let bound: BTreeSet<&str> = variables
                .and_then(Value::as_object)
                .map(|vars| vars.keys().map(String::as_str).collect())
                .unwrap_or_default();
            for placeholder in placeholders(text) {
                if !bound.contains(placeholder) {
                    insert_name(placeholder, names);
                }
            }
            if let Some(vars) = variables {
                collect(vars, names);
            }
        }
        _ => {}
    }
}

/// Placeholder names in an `Fn::Sub` template, attribute suffix stripped
fn placeholders(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let inner = &after[..end];
        if !inner.starts_with('!') && !inner.is_empty() {
            let name = if inner.starts_with(PSEUDO_PREFIX) {
                inner
            } else {
                inner.split('.').next().unwrap_or(inner)
            };
            found.push(name);
        }
        rest = &after[end + 1..];
    }
    found
}

fn insert_name(name: &str, names: &mut BTreeSet<String>) {
    if !name.starts_with(PSEUDO_PREFIX) {
        names.insert(name.to_string());
    }
}
