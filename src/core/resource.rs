//! Resources (targets): per-invocation working attributes, typed schemas,
//! and the validation/error list every task carries.

use super::error::ActionError;
use super::fields::{kind_name, Fields};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Error-list key used for faults raised during an action.
pub const EXCEPTION_KIND: &str = "exception";

/// Expected wire type of a declared attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Any,
    String,
    Number,
    Boolean,
    List,
    Mapping,
}

impl FieldKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Mapping => value.is_object(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::List => write!(f, "list"),
            Self::Mapping => write!(f, "mapping"),
        }
    }
}

/// A named, typed attribute of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl AttributeSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Explicit schema for one resource type: declared attributes plus the
/// subset that must be present before any action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    pub attributes: Vec<AttributeSpec>,
    pub required: Vec<&'static str>,
}

impl ResourceSchema {
    pub fn new(attributes: Vec<AttributeSpec>, required: Vec<&'static str>) -> Self {
        Self {
            attributes,
            required,
        }
    }

    /// A schema that accepts anything.
    pub fn open() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// One entry of a resource's error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceError {
    /// Attribute name, or a kind such as `exception`
    pub key: String,
    pub message: String,
    /// Causal chain of an action fault, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.message)
    }
}

/// Working state for one task invocation.
///
/// Attributes are the field snapshot overlaid by the task's resolved params.
/// `supplied` names the attributes the params set; the rest were inherited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub type_key: String,
    pub attributes: Fields,
    pub errors: Vec<ResourceError>,
    #[serde(skip)]
    supplied: Vec<String>,
}

impl Resource {
    pub fn new(type_key: impl Into<String>, attributes: Fields) -> Self {
        Self {
            type_key: type_key.into(),
            attributes,
            errors: Vec::new(),
            supplied: Vec::new(),
        }
    }

    /// Mark attributes as set by the task's own params.
    pub fn with_supplied(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.supplied.extend(names);
        self
    }

    /// Whether the task's params set `name` (as opposed to the field store).
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.iter().any(|n| n == name)
    }

    /// Optional attribute of a given kind. An inherited value of another kind
    /// is ignored; a supplied one is an error.
    pub fn opt_attr(
        &self,
        name: &str,
        kind: FieldKind,
        expected: &'static str,
    ) -> Result<Option<&Value>, ActionError> {
        match self.get(name) {
            Some(value) if kind.matches(value) => Ok(Some(value)),
            Some(_) if self.is_supplied(name) => Err(ActionError::InvalidAttribute {
                name: name.to_string(),
                expected,
            }),
            _ => Ok(None),
        }
    }

    /// Attribute value; `null` counts as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append an `(attribute, message)` error.
    pub fn add_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ResourceError {
            key: key.into(),
            message: message.into(),
            trace: Vec::new(),
        });
    }

    /// Record an action fault under the `exception` kind with its source chain.
    pub fn record_exception(&mut self, error: &(dyn std::error::Error + 'static)) {
        let mut trace = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        self.errors.push(ResourceError {
            key: EXCEPTION_KIND.to_string(),
            message: error.to_string(),
            trace,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Apply the schema's presence and type rules. Appends one error per
    /// violation and returns whether the resource is valid.
    ///
    /// Presence counts inherited fields; kinds are only checked on supplied
    /// attributes, since the field store may hold unrelated data under the
    /// same name.
    pub fn validate(&mut self, schema: &ResourceSchema) -> bool {
        for name in &schema.required {
            if !self.has(name) {
                self.add_error(*name, "is required");
            }
        }
        for spec in &schema.attributes {
            if !self.is_supplied(spec.name) {
                continue;
            }
            let mismatch = match self.get(spec.name) {
                Some(value) if !spec.kind.matches(value) => Some(kind_name(value)),
                _ => None,
            };
            if let Some(found) = mismatch {
                self.add_error(
                    spec.name,
                    format!("must be a {} (found {})", spec.kind, found),
                );
            }
        }
        self.is_valid()
    }

    /// Fail unless every name is present, listing the missing ones.
    pub fn require_attributes(&self, names: &[&str]) -> Result<(), ActionError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has(name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ActionError::MissingAttributes(missing))
        }
    }

    /// String attribute, or an error naming the expected type.
    pub fn str_attr(&self, name: &str) -> Result<&str, ActionError> {
        self.require_attributes(&[name])?;
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidAttribute {
                name: name.to_string(),
                expected: "a string",
            })
    }

    /// Optional string attribute.
    pub fn opt_str_attr(&self, name: &str) -> Result<Option<&str>, ActionError> {
        Ok(self
            .opt_attr(name, FieldKind::String, "a string")?
            .and_then(Value::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(v: Value) -> Resource {
        let attrs: Fields = v
            .as_object()
            .cloned()
            .unwrap()
            .into_iter()
            .collect();
        let supplied: Vec<String> = attrs.keys().cloned().collect();
        Resource::new("ssh", attrs).with_supplied(supplied)
    }

    fn inherited(v: Value) -> Resource {
        Resource::new("ssh", v.as_object().cloned().unwrap().into_iter().collect())
    }

    fn ssh_schema() -> ResourceSchema {
        ResourceSchema::new(
            vec![
                AttributeSpec::new("host", FieldKind::String),
                AttributeSpec::new("port", FieldKind::Number),
                AttributeSpec::new("tags", FieldKind::List),
            ],
            vec!["host", "user"],
        )
    }

    #[test]
    fn test_validate_ok() {
        let mut r = resource(json!({"host": "db1", "user": "root", "port": 22}));
        assert!(r.validate(&ssh_schema()));
        assert!(r.errors.is_empty());
    }

    #[test]
    fn test_validate_missing_required() {
        let mut r = resource(json!({"port": 22}));
        assert!(!r.validate(&ssh_schema()));
        let keys: Vec<_> = r.errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["host", "user"]);
        assert!(r.errors.iter().all(|e| e.message == "is required"));
    }

    #[test]
    fn test_validate_null_counts_as_missing() {
        let mut r = resource(json!({"host": null, "user": "root"}));
        assert!(!r.validate(&ssh_schema()));
        assert_eq!(r.errors[0].key, "host");
    }

    #[test]
    fn test_validate_wrong_kind() {
        let mut r = resource(json!({"host": "db1", "user": "root", "tags": "a,b"}));
        assert!(!r.validate(&ssh_schema()));
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].key, "tags");
        assert_eq!(r.errors[0].message, "must be a list (found string)");
    }

    #[test]
    fn test_validate_skips_kind_of_inherited() {
        let mut r = inherited(json!({"host": "db1", "user": "root", "tags": "prod"}));
        assert!(r.validate(&ssh_schema()));
    }

    #[test]
    fn test_validate_required_may_be_inherited() {
        let mut r = inherited(json!({"port": 22}));
        assert!(!r.validate(&ssh_schema()));
        assert_eq!(r.errors.len(), 2);
    }

    #[test]
    fn test_opt_attr_inherited_mismatch_ignored() {
        let r = inherited(json!({"cwd": 3}));
        assert_eq!(r.opt_str_attr("cwd").unwrap(), None);
        let r = resource(json!({"cwd": 3}));
        assert!(matches!(
            r.opt_str_attr("cwd"),
            Err(ActionError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_open_schema_accepts_anything() {
        let mut r = resource(json!({}));
        assert!(r.validate(&ResourceSchema::open()));
    }

    #[test]
    fn test_require_attributes_both_missing() {
        let r = resource(json!({}));
        let err = r.require_attributes(&["host", "user"]).unwrap_err();
        assert_eq!(err.to_string(), "host and user are required for this operation");
    }

    #[test]
    fn test_require_attributes_one_missing() {
        let r = resource(json!({"user": "root"}));
        let err = r.require_attributes(&["host", "user"]).unwrap_err();
        assert_eq!(err.to_string(), "host is required for this operation");
    }

    #[test]
    fn test_require_attributes_present() {
        let r = resource(json!({"host": "db1", "user": "root"}));
        assert!(r.require_attributes(&["host", "user"]).is_ok());
    }

    #[test]
    fn test_record_exception_trace() {
        let mut r = resource(json!({}));
        let err = ActionError::Io {
            context: "cannot write /x".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        r.record_exception(&err);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].key, EXCEPTION_KIND);
        assert_eq!(r.errors[0].message, "cannot write /x");
        assert_eq!(r.errors[0].trace, vec!["denied"]);
    }

    #[test]
    fn test_str_attr() {
        let r = resource(json!({"host": "db1", "port": 22}));
        assert_eq!(r.str_attr("host").unwrap(), "db1");
        assert!(matches!(
            r.str_attr("port"),
            Err(ActionError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            r.str_attr("user"),
            Err(ActionError::MissingAttributes(_))
        ));
        assert_eq!(r.opt_str_attr("user").unwrap(), None);
    }
}
