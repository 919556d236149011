//! Error types for ember declarations
//!
//! Errors are structured with fields so a failed synth names the offending
//! scope, logical id or configuration key. Nothing here is retryable: every
//! error is a declaration-time problem the caller has to fix.

use thiserror::Error;

/// Default context value when no specific scope is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for declaration and rendering
#[derive(Debug, Error)]
pub enum Error {
    /// A declaration received an input it cannot turn into resources
    #[error("validation error in {scope}: {message}")]
    Validation {
        /// Declaration scope (e.g. "Network", "Compute")
        scope: String,
        /// Description of what's invalid
        message: String,
        /// The offending input field (e.g. "vpcCidr")
        field: Option<String>,
    },

    /// Two resources were declared under the same logical id
    #[error("duplicate logical id {id} in {group}")]
    DuplicateLogicalId {
        /// The colliding logical id
        id: String,
        /// Group the second declaration came from
        group: String,
    },

    /// A resource references something that was never declared
    #[error("{referenced_by} references unknown {target}")]
    UnknownReference {
        /// Logical id of the referencing resource
        referenced_by: String,
        /// The missing logical id or parameter name
        target: String,
    },

    /// The must-follow relation contains a cycle
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Logical ids along the cycle, first id repeated at the end
        path: Vec<String>,
    },

    /// A required context value was not supplied
    #[error("missing context value {key}")]
    MissingContext {
        /// Context key (e.g. "eks_admin")
        key: String,
    },

    /// A context value has the wrong shape
    #[error("invalid context value {key}: {message}")]
    InvalidContext {
        /// Context key
        key: String,
        /// Description of the expected shape
        message: String,
    },

    /// A parameter-store lookup had no value
    #[error("missing parameter {path}")]
    MissingParameter {
        /// Parameter path (e.g. "/Main/Domain")
        path: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// Output format (json, yaml) if known
        format: Option<String>,
    },

    /// Configuration file could not be loaded
    #[error("config error [{path}]: {message}")]
    Config {
        /// Path of the configuration file
        path: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error without scope context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            scope: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a declaration scope
    pub fn validation_for(scope: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            scope: scope.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a declaration scope and input field
    pub fn validation_for_field(
        scope: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            scope: scope.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a duplicate logical id error
    pub fn duplicate_id(id: impl Into<String>, group: impl Into<String>) -> Self {
        Self::DuplicateLogicalId {
            id: id.into(),
            group: group.into(),
        }
    }

    /// Create an unknown reference error
    pub fn unknown_reference(referenced_by: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnknownReference {
            referenced_by: referenced_by.into(),
            target: target.into(),
        }
    }

    /// Create a missing context error
    pub fn missing_context(key: impl Into<String>) -> Self {
        Self::MissingContext { key: key.into() }
    }

    /// Create an invalid context error
    pub fn invalid_context(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidContext {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a missing parameter error
    pub fn missing_parameter(path: impl Into<String>) -> Self {
        Self::MissingParameter { path: path.into() }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: None,
        }
    }

    /// Create a serialization error for a specific output format
    pub fn serialization_for_format(format: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: Some(format.into()),
        }
    }

    /// Create a configuration error for a file path
    pub fn config(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Scope the error was raised in, when it carries one
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Validation { scope, .. } => Some(scope),
            Self::DuplicateLogicalId { group, .. } => Some(group),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization_for_format("json", e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::serialization_for_format("yaml", e.to_string())
    }
}
