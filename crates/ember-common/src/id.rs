//! Logical ids and per-item name generation
//!
//! Every declared resource is addressed by a logical id that must be unique in
//! the graph. Declarations that emit one resource per input item (one mapping
//! per admin identity, one subnet per availability zone) derive the id through
//! a [`NameGenerator`] so that no two items collapse onto the same id.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Maximum logical id length accepted by the provisioning engine
pub const MAX_LOGICAL_ID_LEN: usize = 255;

/// Alphanumeric identifier of a declared resource, parameter or output
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Create a logical id, rejecting empty, overlong or non-alphanumeric input
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::validation("logical id must not be empty"));
        }
        if id.len() > MAX_LOGICAL_ID_LEN {
            return Err(Error::validation(format!(
                "logical id {id} exceeds {MAX_LOGICAL_ID_LEN} characters"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::validation(format!(
                "logical id {id} must be alphanumeric"
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for LogicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert arbitrary text into an alphanumeric PascalCase fragment.
///
/// Non-alphanumeric characters split words; each word keeps its remaining
/// characters and gets an upper-cased first letter. "private-subnet-1" becomes
/// "PrivateSubnet1".
pub fn pascal_case(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Derives a distinct resource name for each item of a repeated declaration.
///
/// Implementations must give distinct items distinct names; a clash that
/// still happens is reported by the caller as a duplicate id.
pub trait NameGenerator {
    /// Name for `item` (at position `index`) under the shared `base` name
    fn name(&self, base: &str, item: &str, index: usize) -> String;
}

/// Appends the PascalCased item to the base: `ClusterAdmin` + `alice` → `ClusterAdminAlice`.
///
/// PascalCasing loses separators and the case of the first letter, so only
/// items it maps back unambiguously (a lowercase letter or digit followed by
/// letters and digits) get the bare form. Every other item also gets the first
/// eight hex digits of the SHA-256 of the raw item, so `bob.smith` and
/// `bob-smith` both start with `ClusterAdminBobSmith` but end differently.
///
/// Stable under reordering of the input list, so re-synthesizing with a
/// shuffled admin list does not rename (and therefore replace) resources.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentitySuffixNames;

impl IdentitySuffixNames {
    /// Whether `pascal_case` keeps everything needed to tell `item` apart
    fn is_plain(item: &str) -> bool {
        let mut chars = item.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {
                chars.all(|c| c.is_ascii_alphanumeric())
            }
            _ => false,
        }
    }

    fn digest(item: &str) -> String {
        Sha256::digest(item.as_bytes())
            .iter()
            .take(4)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl NameGenerator for IdentitySuffixNames {
    fn name(&self, base: &str, item: &str, _index: usize) -> String {
        if Self::is_plain(item) {
            format!("{}{}", base, pascal_case(item))
        } else {
            format!("{}{}{}", base, pascal_case(item), Self::digest(item))
        }
    }
}

/// Appends the item position to the base: `ClusterAdmin` + 0 → `ClusterAdmin0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexSuffixNames;

impl NameGenerator for IndexSuffixNames {
    fn name(&self, base: &str, _item: &str, index: usize) -> String {
        format!("{base}{index}")
    }
}
