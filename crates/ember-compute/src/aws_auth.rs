//! Cluster admin bindings and the aws-auth ConfigMap
//!
//! EKS maps IAM identities to Kubernetes users and groups through the
//! `kube-system/aws-auth` ConfigMap. Each mapping entry is an
//! [`IdentityBinding`] with its own name; the builder refuses two entries under
//! the same name, so a loop over admin identities can never silently overwrite
//! an earlier entry.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};
use tracing::{debug, warn};

use ember_common::id::NameGenerator;
use ember_common::{token, Error, LogicalId, Result, Scope};

use crate::cluster::{Capacity, ClusterRef};
use crate::manifest::{declare_overwriting_manifest, set_path, to_document};

/// Group granting full cluster administration
pub const MASTERS_GROUP: &str = "system:masters";

/// Username the analytics service-linked role is known by inside the cluster
pub const EMR_CONTAINERS_USERNAME: &str = "emr-containers";

/// Name of the analytics service-linked role
pub const EMR_SERVICE_LINKED_ROLE: &str = "AWSServiceRoleForAmazonEMRContainers";

/// Base name of admin mapping entries
pub const CLUSTER_ADMIN_BASE: &str = "ClusterAdmin";

const AWS_AUTH: &str = "aws-auth";
const KUBE_SYSTEM: &str = "kube-system";

/// IAM identity flavour of a mapping entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    /// IAM user, listed under `mapUsers`
    User,
    /// IAM role, listed under `mapRoles`
    Role,
}

/// One identity → privilege mapping
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityBinding {
    /// Unique mapping name
    pub name: LogicalId,
    /// User or role
    pub kind: IdentityKind,
    /// ARN in substitution syntax; `${AWS::AccountId}` and `${Role.Arn}` are resolved at apply time
    pub arn: String,
    /// Kubernetes username, defaults to the ARN
    pub username: Option<String>,
    /// Kubernetes groups
    pub groups: Vec<String>,
}

/// Escape literal `${` so user-supplied text survives substitution
fn escape_substitution(text: &str) -> String {
    text.replace("${", "${!")
}

impl IdentityBinding {
    /// IAM user of the deploying account, by user name
    pub fn user(name: LogicalId, user: &str) -> Self {
        Self {
            name,
            kind: IdentityKind::User,
            arn: format!(
                "arn:${{{}}}:iam::${{{}}}:user/{}",
                token::PARTITION,
                token::ACCOUNT_ID,
                escape_substitution(user)
            ),
            username: None,
            groups: Vec::new(),
        }
    }

    /// IAM role given as an ARN in substitution syntax
    pub fn role(name: LogicalId, arn: impl Into<String>) -> Self {
        Self {
            name,
            kind: IdentityKind::Role,
            arn: arn.into(),
            username: None,
            groups: Vec::new(),
        }
    }

    /// Override the Kubernetes username
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Add Kubernetes groups
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Effective Kubernetes username
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.arn)
    }

    fn entry(&self) -> Value {
        let arn_key = match self.kind {
            IdentityKind::User => "userarn",
            IdentityKind::Role => "rolearn",
        };
        json!({
            (arn_key): self.arn,
            "username": self.username(),
            "groups": self.groups
        })
    }
}

/// Admin mappings for IAM users of the deploying account, one per distinct user.
///
/// Names come from `names` under the `ClusterAdmin` base. Repeated users are
/// dropped with a warning; distinct users the generator maps to the same name
/// fail when added to [`AwsAuth`].
pub fn admin_bindings(admins: &[String], names: &dyn NameGenerator) -> Result<Vec<IdentityBinding>> {
    let mut seen = BTreeSet::new();
    let mut bindings = Vec::with_capacity(admins.len());
    for (index, admin) in admins.iter().enumerate() {
        if admin.is_empty() {
            return Err(Error::invalid_context(
                ember_common::context::EKS_ADMIN_KEY,
                format!("admin identity at position {index} is empty"),
            ));
        }
        if !seen.insert(admin.as_str()) {
            warn!(admin = %admin, "ignoring repeated cluster admin");
            continue;
        }
        let name = LogicalId::new(names.name(CLUSTER_ADMIN_BASE, admin, index))?;
        bindings.push(IdentityBinding::user(name, admin).with_groups([MASTERS_GROUP]));
    }
    Ok(bindings)
}

/// Mapping that lets the cluster's capacity join it
pub fn capacity_binding(capacity: &Capacity) -> Result<IdentityBinding> {
    let arn = format!("${{{}.Arn}}", capacity.role().role);
    let binding = match capacity {
        Capacity::NodeGroup { .. } => IdentityBinding::role(LogicalId::new("NodeRoleMapping")?, arn)
            .with_username("system:node:{{EC2PrivateDNSName}}")
            .with_groups(["system:bootstrappers", "system:nodes"]),
        Capacity::Serverless { .. } => {
            IdentityBinding::role(LogicalId::new("PodExecutionRoleMapping")?, arn)
                .with_username("system:node:{{SessionName}}")
                .with_groups(["system:bootstrappers", "system:nodes", "system:node-proxier"])
        }
    };
    Ok(binding)
}

/// Mapping for the analytics service-linked role: fixed username, no groups
pub fn service_linked_binding() -> Result<IdentityBinding> {
    Ok(IdentityBinding::role(
        LogicalId::new("EmrContainersMapping")?,
        format!(
            "arn:${{{}}}:iam::${{{}}}:role/{EMR_SERVICE_LINKED_ROLE}",
            token::PARTITION,
            token::ACCOUNT_ID
        ),
    )
    .with_username(EMR_CONTAINERS_USERNAME))
}

/// The set of mapping entries written to aws-auth
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AwsAuth {
    bindings: Vec<IdentityBinding>,
}

impl AwsAuth {
    /// Empty mapping table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; its name must not be taken
    pub fn add(&mut self, binding: IdentityBinding) -> Result<()> {
        if self.bindings.iter().any(|b| b.name == binding.name) {
            return Err(Error::duplicate_id(binding.name.as_str(), AWS_AUTH));
        }
        debug!(mapping = %binding.name, groups = ?binding.groups, "added identity mapping");
        self.bindings.push(binding);
        Ok(())
    }

    /// Entries in insertion order
    pub fn bindings(&self) -> &[IdentityBinding] {
        &self.bindings
    }

    fn section(&self, kind: IdentityKind) -> Result<Option<Value>> {
        let entries: Vec<Value> = self
            .bindings
            .iter()
            .filter(|b| b.kind == kind)
            .map(IdentityBinding::entry)
            .collect();
        if entries.is_empty() {
            return Ok(None);
        }
        // JSON is valid YAML, which is what the authenticator parses
        let text = serde_json::to_string(&entries)?;
        Ok(Some(token::sub(text)))
    }

    /// The ConfigMap document, with `mapRoles`/`mapUsers` as substitution tokens
    pub fn config_map(&self) -> Result<Value> {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(AWS_AUTH.to_string()),
                namespace: Some(KUBE_SYSTEM.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut document = to_document(&config_map)?;
        if let Some(roles) = self.section(IdentityKind::Role)? {
            set_path(&mut document, &["data", "mapRoles"], roles)?;
        }
        if let Some(users) = self.section(IdentityKind::User)? {
            set_path(&mut document, &["data", "mapUsers"], users)?;
        }
        Ok(document)
    }

    /// Declare the ConfigMap, replacing the one EKS created with the cluster
    pub fn declare(&self, scope: &mut Scope<'_>, cluster: &ClusterRef) -> Result<LogicalId> {
        declare_overwriting_manifest(scope, cluster, "AwsAuth", vec![self.config_map()?])
    }
}
