//! Context values supplied at assembly time
//!
//! Declarations never read process-wide state. Whatever the assembly needs
//! from its surroundings (the cluster admin list, the workspace administrator)
//! comes through a [`ContextProvider`] passed in by the caller, so tests can
//! substitute fixed values.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// Context key: user names granted cluster administration
pub const EKS_ADMIN_KEY: &str = "eks_admin";

/// Context key: identity mapped to the workspace administrator policy
pub const STUDIO_ADMIN_KEY: &str = "emr_studio_admin";

/// Key-value lookup of assembly context
pub trait ContextProvider {
    /// Raw value for `key`, if present
    fn get(&self, key: &str) -> Option<Value>;

    /// String value for `key`; present values of any other shape are an error
    fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::invalid_context(
                key,
                format!("expected a string, got {other}"),
            )),
        }
    }

    /// List of strings for `key`.
    ///
    /// A missing key is an empty list and a single string is a one-element
    /// list. Anything else that is not an array of strings is an error.
    fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s]),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(Error::invalid_context(
                        key,
                        format!("expected a list of strings, found element {other}"),
                    )),
                })
                .collect(),
            Some(other) => Err(Error::invalid_context(
                key,
                format!("expected a list of strings, got {other}"),
            )),
        }
    }

    /// String value for `key`, failing when absent
    fn required_string(&self, key: &str) -> Result<String> {
        self.string(key)?.ok_or_else(|| Error::missing_context(key))
    }
}

/// In-memory context
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticContext {
    values: BTreeMap<String, Value>,
}

impl StaticContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Layer `overrides` on top of this context; their keys win
    pub fn merge(&mut self, overrides: StaticContext) {
        self.values.extend(overrides.values);
    }

    /// Keys present, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl ContextProvider for StaticContext {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

impl<P: ContextProvider + ?Sized> ContextProvider for &P {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }
}

/// Shape of a context file: `{"context": {...}}`, other top-level keys ignored
#[derive(Debug, Deserialize)]
struct ContextDocument {
    #[serde(default)]
    context: BTreeMap<String, Value>,
}

/// Loader for JSON context files
pub struct ContextFile;

impl ContextFile {
    /// Parse context file contents
    pub fn parse(contents: &str) -> Result<StaticContext> {
        let document: ContextDocument = serde_json::from_str(contents)?;
        Ok(StaticContext {
            values: document.context,
        })
    }

    /// Read and parse a context file
    pub fn load(path: &Path) -> Result<StaticContext> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))
    }
}

/// Parse a `key=value` override; the value is JSON when it parses, else a string
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::invalid_context(raw, "expected key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::invalid_context(raw, "empty context key"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_string_list_shapes() {
        let context = StaticContext::new()
            .with("list", json!(["alice", "bob"]))
            .with("single", json!("carol"))
            .with("bad", json!(3))
            .with("mixed", json!(["alice", 1]));

        assert_eq!(
            context.string_list("list").expect("list"),
            vec!["alice", "bob"]
        );
        assert_eq!(context.string_list("single").expect("single"), vec!["carol"]);
        assert!(context.string_list("missing").expect("missing").is_empty());
        assert!(context.string_list("bad").is_err());
        assert!(context.string_list("mixed").is_err());
    }

    #[test]
    fn test_string_and_required_string() {
        let context = StaticContext::new().with(STUDIO_ADMIN_KEY, json!("admin"));
        assert_eq!(
            context.string(STUDIO_ADMIN_KEY).expect("string").as_deref(),
            Some("admin")
        );
        assert!(context.string("absent").expect("absent").is_none());
        assert!(matches!(
            context.required_string("absent"),
            Err(Error::MissingContext { .. })
        ));
    }

    #[test]
    fn test_context_file_reads_context_section() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"app": "ember synth", "context": {{"eks_admin": ["alice"]}}}}"#
        )
        .expect("write");

        let context = ContextFile::load(file.path()).expect("load");
        assert_eq!(
            context.string_list(EKS_ADMIN_KEY).expect("admins"),
            vec!["alice"]
        );
    }

    #[test]
    fn test_context_file_errors_name_the_path() {
        let err = ContextFile::load(Path::new("/nonexistent/context.json")).expect_err("missing file");
        assert!(matches!(err, Error::Config { ref path, .. } if path.contains("context.json")));
    }

    #[rstest]
    #[case("eks_admin=[\"alice\",\"bob\"]", "eks_admin", json!(["alice", "bob"]))]
    #[case("emr_studio_admin=admin", "emr_studio_admin", json!("admin"))]
    #[case("count=3", "count", json!(3))]
    #[case("url=a=b", "url", json!("a=b"))]
    fn test_parse_override(#[case] raw: &str, #[case] key: &str, #[case] value: Value) {
        assert_eq!(
            parse_override(raw).expect("override"),
            (key.to_string(), value)
        );
    }

    #[test]
    fn test_parse_override_rejects_malformed() {
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let mut base = StaticContext::new().with("a", json!(1)).with("b", json!(2));
        base.merge(StaticContext::new().with("b", json!(3)));
        assert_eq!(base.get("a"), Some(json!(1)));
        assert_eq!(base.get("b"), Some(json!(3)));
    }
}
