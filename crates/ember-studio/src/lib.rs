//! Notebook workspace declaration
//!
//! A studio needs a bucket for notebooks, a pair of security groups so
//! workspaces can reach the notebook engine, a service role, and for SSO
//! studios a user role plus an optional session mapping for the administrator.
//! Users and the administrator share one managed policy.

#![deny(missing_docs)]

pub mod bucket;
pub mod roles;
pub mod security_groups;
pub mod studio;

pub use bucket::{blocks_public_access, is_versioned, BucketEncryption};
pub use security_groups::{SecurityGroupsRef, DEFAULT_ENGINE_PORT};
pub use studio::AuthMode;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use ember_common::iam::RoleRef;
use ember_common::{token, Error, LogicalId, Result, Scope};
use ember_network::NetworkRef;

use crate::studio::{declare_session_mapping, declare_studio, StudioBindings};

/// Workspace declaration inputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioSpec {
    /// Studio name
    pub name: String,
    /// Sign-in mode
    pub auth_mode: AuthMode,
    /// Bucket name prefix; the account id is appended
    pub bucket_name_prefix: String,
    /// Bucket encryption
    pub bucket_encryption: BucketEncryption,
    /// Key prefix of workspace storage inside the bucket
    pub location_prefix: String,
    /// Port the notebook engine listens on
    pub engine_port: u16,
}

impl Default for StudioSpec {
    fn default() -> Self {
        Self {
            name: "emr-studio".to_string(),
            auth_mode: AuthMode::Sso,
            bucket_name_prefix: "aws-emr-workspace-bk".to_string(),
            bucket_encryption: BucketEncryption::KmsManaged,
            location_prefix: "studio".to_string(),
            engine_port: DEFAULT_ENGINE_PORT,
        }
    }
}

/// What the workspace declaration exposes
#[derive(Clone, Debug, PartialEq)]
pub struct StudioRef {
    /// Workspace bucket
    pub bucket: LogicalId,
    /// Engine and workspace groups
    pub security_groups: SecurityGroupsRef,
    /// Service role
    pub service_role: RoleRef,
    /// Administrator managed policy, shared with the user role; SSO studios only
    pub admin_policy: Option<LogicalId>,
    /// User role
    pub user_role: Option<RoleRef>,
    /// Studio
    pub studio: LogicalId,
    /// Administrator session mapping, when an administrator was given
    pub session_mapping: Option<LogicalId>,
}

impl StudioRef {
    /// Studio URL token
    pub fn url(&self) -> Value {
        token::attribute(&self.studio, "Url")
    }
}

/// Declare the workspace in `scope`, optionally mapping `admin` to the administrator policy
pub fn declare(
    scope: &mut Scope<'_>,
    network: &NetworkRef,
    spec: &StudioSpec,
    admin: Option<&str>,
) -> Result<StudioRef> {
    info!(group = scope.group(), name = %spec.name, admin = ?admin, "declaring studio");
    if network.private_subnet_ids().is_empty() {
        return Err(Error::validation_for_field(
            scope.group(),
            "network",
            "the studio needs at least one private subnet",
        ));
    }
    if admin.is_some() && spec.auth_mode == AuthMode::Iam {
        return Err(Error::validation_for_field(
            scope.group(),
            "authMode",
            "session mappings require SSO authentication",
        ));
    }

    let bucket = bucket::declare_bucket(scope, &spec.bucket_name_prefix, spec.bucket_encryption)?;
    let security_groups =
        security_groups::declare_security_groups(scope, network, spec.engine_port)?;
    let service_role = roles::declare_service_role(scope)?;
    // IAM studios take permissions from the caller's own policies
    let (admin_policy, user_role) = match spec.auth_mode {
        AuthMode::Sso => {
            let policy = roles::declare_admin_policy(scope, &service_role, &bucket)?;
            let role = roles::declare_user_role(scope, &policy)?;
            (Some(policy), Some(role))
        }
        AuthMode::Iam => (None, None),
    };

    let studio = declare_studio(
        scope,
        &StudioBindings {
            name: &spec.name,
            auth_mode: spec.auth_mode,
            bucket: &bucket,
            location_prefix: &spec.location_prefix,
            security_groups: &security_groups,
            service_role: &service_role,
            user_role: user_role.as_ref(),
            network,
        },
    )?;
    // the studio validates its groups and role permissions when it is created
    for rule in &security_groups.rules {
        scope.depend(&studio, rule)?;
    }
    if let Some(policy) = &service_role.policy {
        scope.depend(&studio, policy)?;
    }

    let session_mapping = match (admin, &admin_policy) {
        (Some(identity), Some(policy)) => {
            Some(declare_session_mapping(scope, &studio, identity, policy)?)
        }
        _ => None,
    };
    debug!(studio = %studio, mapped = session_mapping.is_some(), "declared studio");

    Ok(StudioRef {
        bucket,
        security_groups,
        service_role,
        admin_policy,
        user_role,
        studio,
        session_mapping,
    })
}
