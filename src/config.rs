//! Assembly configuration file
//!
//! Every field is optional; an empty document yields the reference
//! deployment. The file format follows the extension: `.yaml`/`.yml` is YAML,
//! anything else is JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ember_common::id::{IdentitySuffixNames, IndexSuffixNames, NameGenerator};
use ember_common::Error as DeclarationError;
use ember_compute::ComputeSpec;
use ember_endpoint::EndpointSpec;
use ember_network::NetworkSpec;
use ember_studio::StudioSpec;

use crate::Result;

/// How repeated declarations (one per admin identity) are named
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Naming {
    /// Append the PascalCased identity; stable when the list is reordered
    #[default]
    Identity,
    /// Append the list position
    Index,
}

impl Naming {
    /// Generator implementing this strategy
    pub fn generator(self) -> &'static dyn NameGenerator {
        match self {
            Self::Identity => &IdentitySuffixNames,
            Self::Index => &IndexSuffixNames,
        }
    }
}

/// Inputs of the whole assembly
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyConfig {
    /// Template description; the built-in one when absent
    pub description: Option<String>,
    /// Mapping name strategy
    pub naming: Naming,
    /// Network declaration inputs
    pub network: NetworkSpec,
    /// Compute declaration inputs
    pub compute: ComputeSpec,
    /// Workspace declaration inputs
    pub studio: StudioSpec,
    /// Endpoint declaration inputs
    pub endpoint: EndpointSpec,
}

impl AssemblyConfig {
    /// Parse a JSON document
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| DeclarationError::config("<json>", e.to_string()).into())
    }

    /// Parse a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| DeclarationError::config("<yaml>", e.to_string()).into())
    }

    /// Load from `path`, choosing the format by extension
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DeclarationError::config(display.clone(), e.to_string()))?;
        let parsed: std::result::Result<Self, String> = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| DeclarationError::config(display, message).into())
    }
}
