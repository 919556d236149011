//! Kubernetes manifests applied to the cluster through the kubectl handler
//!
//! A manifest resource carries one or more Kubernetes objects as JSON. Objects
//! are built with `k8s-openapi` types, converted to JSON, and may then have
//! individual fields replaced by tokens (an IRSA role ARN, a node role ARN).

use serde::Serialize;
use serde_json::{json, Value};

use ember_common::{Error, LogicalId, Resource, Result, Scope};

use crate::cluster::ClusterRef;

/// Resource type of a manifest applied through the kubectl handler
pub const MANIFEST_TYPE: &str = "Custom::KubernetesManifest";

/// Resource type of a Helm release installed through the kubectl handler
pub const HELM_CHART_TYPE: &str = "Custom::HelmChart";

/// Convert a typed Kubernetes object into its JSON document
pub fn to_document<T: Serialize>(object: &T) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| Error::serialization_for_format("json", e.to_string()))
}

/// Declare a manifest named `local` carrying `documents`
pub fn declare_manifest(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    local: &str,
    documents: Vec<Value>,
) -> Result<LogicalId> {
    add_manifest(scope, cluster, local, documents, false)
}

/// Declare a manifest that replaces an object the cluster already created
pub fn declare_overwriting_manifest(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    local: &str,
    documents: Vec<Value>,
) -> Result<LogicalId> {
    add_manifest(scope, cluster, local, documents, true)
}

fn add_manifest(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    local: &str,
    documents: Vec<Value>,
    overwrite: bool,
) -> Result<LogicalId> {
    if documents.is_empty() {
        return Err(Error::validation_for(
            scope.group(),
            format!("manifest {local} has no documents"),
        ));
    }
    let id = scope.id(local)?;
    let mut resource = Resource::new(MANIFEST_TYPE, id).with_properties(json!({
        "ServiceToken": cluster.kubectl_handler.clone(),
        "ClusterName": cluster.name(),
        "Manifest": documents
    }));
    if overwrite {
        resource = resource.with_property("Overwrite", json!(true));
    }
    scope.add(resource)
}

/// A Helm release
#[derive(Clone, Debug)]
pub struct HelmChart {
    /// Release name
    pub release: String,
    /// Chart name
    pub chart: String,
    /// Chart repository URL
    pub repository: String,
    /// Target namespace
    pub namespace: String,
    /// Chart values, may contain tokens
    pub values: Value,
}

/// Declare a Helm release named `local`
pub fn declare_helm_chart(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    local: &str,
    chart: &HelmChart,
) -> Result<LogicalId> {
    let id = scope.id(local)?;
    scope.add(
        Resource::new(HELM_CHART_TYPE, id).with_properties(json!({
            "ServiceToken": cluster.kubectl_handler.clone(),
            "ClusterName": cluster.name(),
            "Release": chart.release,
            "Chart": chart.chart,
            "Repository": chart.repository,
            "Namespace": chart.namespace,
            "Values": chart.values,
            "Wait": true
        })),
    )
}

/// Replace the value at `path` (object keys) in a document
pub fn set_path(document: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(Error::validation("empty document path"));
    };
    let mut cursor = document;
    for key in parents {
        cursor = cursor
            .as_object_mut()
            .map(|map| map.entry(key.to_string()).or_insert_with(|| json!({})))
            .ok_or_else(|| Error::validation(format!("{key} is not an object")))?;
    }
    cursor
        .as_object_mut()
        .ok_or_else(|| Error::validation(format!("parent of {last} is not an object")))?
        .insert(last.to_string(), value);
    Ok(())
}

/// Whether a manifest document is of the given kind
pub fn is_kind(document: &Value, kind: &str) -> bool {
    document.get("kind").and_then(Value::as_str) == Some(kind)
}

/// Documents carried by a manifest resource
pub fn documents(resource: &Resource) -> &[Value] {
    resource
        .property("Manifest")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_typed_objects_carry_api_version_and_kind() {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some("spark".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let document = to_document(&namespace).expect("namespace serializes");
        assert_eq!(document["apiVersion"], json!("v1"));
        assert!(is_kind(&document, "Namespace"));
        assert_eq!(document["metadata"]["name"], json!("spark"));
    }

    #[test]
    fn test_set_path_creates_intermediate_objects() {
        let mut document = json!({ "metadata": { "name": "sa" } });
        set_path(
            &mut document,
            &["metadata", "annotations", "eks.amazonaws.com/role-arn"],
            json!({ "Fn::GetAtt": ["Role", "Arn"] }),
        )
        .expect("path set");
        assert_eq!(
            document["metadata"]["annotations"]["eks.amazonaws.com/role-arn"],
            json!({ "Fn::GetAtt": ["Role", "Arn"] })
        );
        assert!(set_path(&mut json!("scalar"), &["a"], json!(1)).is_err());
        assert!(set_path(&mut json!({}), &[], json!(1)).is_err());
    }
}
