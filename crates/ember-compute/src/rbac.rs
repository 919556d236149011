//! Namespace and RBAC manifests for the analytics service
//!
//! The analytics service acts inside its namespace as the Kubernetes user
//! `emr-containers`. It is granted a fixed Role through a RoleBinding; the
//! rule table below is what the service documents as its minimum and must not
//! drift.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use ember_common::id::pascal_case;
use ember_common::{Error, LogicalId, Result, Scope};

use crate::cluster::ClusterRef;
use crate::manifest::{declare_manifest, to_document};

/// Name of the Role, the RoleBinding and the bound user
pub const EMR_CONTAINERS: &str = "emr-containers";

/// API group of RBAC objects
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

const READ_WRITE: &[&str] = &[
    "get", "list", "watch", "describe", "create", "edit", "delete", "annotate", "patch", "label",
];

const READ_WRITE_COLLECTION: &[&str] = &[
    "get",
    "list",
    "watch",
    "describe",
    "create",
    "edit",
    "delete",
    "deletecollection",
    "annotate",
    "patch",
    "label",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

/// Rules granted to the analytics service in its namespace
pub fn role_rules() -> Vec<PolicyRule> {
    vec![
        rule("", &["namespaces"], &["get"]),
        rule(
            "",
            &["serviceaccounts", "services", "configmaps", "events", "pods", "pods/log"],
            READ_WRITE_COLLECTION,
        ),
        rule("", &["secrets"], &["create", "patch", "delete", "watch"]),
        rule("apps", &["statefulsets", "deployments"], READ_WRITE),
        rule("batch", &["jobs"], READ_WRITE),
        rule("extensions", &["ingresses"], READ_WRITE),
        rule(RBAC_API_GROUP, &["roles", "rolebindings"], READ_WRITE_COLLECTION),
    ]
}

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// Namespace object
pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: metadata(name, None),
        ..Default::default()
    }
}

/// The analytics service Role in `namespace`
pub fn role(namespace: &str) -> Role {
    Role {
        metadata: metadata(EMR_CONTAINERS, Some(namespace)),
        rules: Some(role_rules()),
    }
}

/// Binds the analytics service user to its Role in `namespace`
pub fn role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: metadata(EMR_CONTAINERS, Some(namespace)),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: EMR_CONTAINERS.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "User".to_string(),
            name: EMR_CONTAINERS.to_string(),
            namespace: None,
        }]),
    }
}

/// Manifests granting the analytics service access to its namespace
#[derive(Clone, Debug, PartialEq)]
pub struct RbacRef {
    /// Namespace manifest
    pub namespace: LogicalId,
    /// Role manifest
    pub role: LogicalId,
    /// RoleBinding manifest
    pub binding: LogicalId,
}

/// Declare a namespace manifest named after the namespace
pub fn declare_namespace(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    name: &str,
) -> Result<LogicalId> {
    check_namespace_name(scope.group(), "namespaces", name)?;
    declare_manifest(
        scope,
        cluster,
        &format!("{}Namespace", pascal_case(name)),
        vec![to_document(&namespace(name))?],
    )
}

/// Check that `name` is a DNS-1123 label: at most 63 lowercase alphanumerics
/// or '-', starting and ending with an alphanumeric.
pub fn check_namespace_name(group: &str, field: &str, name: &str) -> Result<()> {
    let alphanumeric = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid = (1..=63).contains(&name.len())
        && name.chars().all(|c| alphanumeric(c) || c == '-')
        && name.starts_with(alphanumeric)
        && name.ends_with(alphanumeric);
    if valid {
        Ok(())
    } else {
        Err(Error::validation_for_field(
            group,
            field,
            format!("namespace name {name:?} is not a DNS-1123 label"),
        ))
    }
}

/// Declare the role and binding in an already declared namespace.
///
/// The role follows the namespace and the binding follows the role, both as
/// explicit edges: manifests reference the cluster, never each other.
pub fn declare_rbac(
    scope: &mut Scope<'_>,
    cluster: &ClusterRef,
    namespace_manifest: &LogicalId,
    namespace: &str,
) -> Result<RbacRef> {
    let role_manifest = declare_manifest(scope, cluster, "EmrRole", vec![to_document(&role(namespace))?])?;
    scope.depend(&role_manifest, namespace_manifest)?;

    let binding = declare_manifest(
        scope,
        cluster,
        "EmrRoleBinding",
        vec![to_document(&role_binding(namespace))?],
    )?;
    scope.depend(&binding, &role_manifest)?;
    debug!(namespace, role = %role_manifest, binding = %binding, "declared rbac manifests");

    Ok(RbacRef {
        namespace: namespace_manifest.clone(),
        role: role_manifest,
        binding,
    })
}
