//! Template resolution against a field snapshot.
//!
//! Two placeholder forms:
//! - `${name}` is replaced in place by the string form of the field; any number
//!   may appear inside surrounding text.
//! - `$f:name` must be the entire value and is replaced by the field itself,
//!   keeping its type (a list stays a list).
//!
//! Mappings and lists are walked recursively; every other literal passes
//! through untouched. Resolution is single pass: substituted text is never
//! re-scanned.

use super::error::ResolveError;
use super::fields::{FieldStore, Fields};
use serde_json::Value;

const FIELD_REF: &str = "$f:";

/// Anything templates can read fields from.
pub trait FieldSource {
    /// Current value of `name`, or `None` when absent. `null` is absent.
    fn field(&self, name: &str) -> Option<&Value>;
}

impl FieldSource for FieldStore {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl FieldSource for Fields {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name).filter(|v| !v.is_null())
    }
}

/// A parsed piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Field(&'a str),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template<'a> {
    /// `$f:name`, a whole-value reference.
    FieldRef(&'a str),
    /// Text with zero or more `${name}` placeholders.
    Interpolated(Vec<Segment<'a>>),
}

impl Template<'_> {
    /// Field names this template reads, in order of appearance.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            Template::FieldRef(name) => vec![*name],
            Template::Interpolated(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Field(name) => Some(*name),
                    Segment::Literal(_) => None,
                })
                .collect(),
        }
    }
}

/// Parse a string into a template without resolving anything.
pub fn parse_template(raw: &str) -> Result<Template<'_>, ResolveError> {
    if let Some(name) = raw.strip_prefix(FIELD_REF) {
        if name.is_empty() {
            return Err(ResolveError::EmptyName);
        }
        if name.contains(|c: char| c.is_whitespace() || c == '$' || c == '{' || c == '}') {
            return Err(ResolveError::MisplacedFieldRef(raw.to_string()));
        }
        return Ok(Template::FieldRef(name));
    }
    if raw.contains(FIELD_REF) {
        return Err(ResolveError::MisplacedFieldRef(raw.to_string()));
    }

    let mut segments = Vec::new();
    let mut start = 0;

    while let Some(open) = raw[start..].find("${") {
        let open = start + open;
        let close = raw[open..]
            .find('}')
            .ok_or(ResolveError::Unclosed(open))?;
        let close = open + close;
        let name = raw[open + 2..close].trim();
        if name.is_empty() {
            return Err(ResolveError::EmptyName);
        }

        if open > start {
            segments.push(Segment::Literal(&raw[start..open]));
        }
        segments.push(Segment::Field(name));
        start = close + 1;
    }

    if start < raw.len() {
        segments.push(Segment::Literal(&raw[start..]));
    }

    Ok(Template::Interpolated(segments))
}

/// Canonical string form of a field value for `${name}` substitution.
pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // Compact JSON; serde_json keeps mapping order with preserve_order.
        other => other.to_string(),
    }
}

/// Resolve one template string.
pub fn resolve_template<S: FieldSource + ?Sized>(
    raw: &str,
    source: &S,
) -> Result<Value, ResolveError> {
    match parse_template(raw)? {
        Template::FieldRef(name) => source
            .field(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnresolvedField(name.to_string())),
        Template::Interpolated(segments) => {
            if !segments.iter().any(|s| matches!(s, Segment::Field(_))) {
                return Ok(Value::String(raw.to_string()));
            }
            let mut result = String::with_capacity(raw.len());
            for segment in segments {
                match segment {
                    Segment::Literal(text) => result.push_str(text),
                    Segment::Field(name) => {
                        let value = source
                            .field(name)
                            .ok_or_else(|| ResolveError::UnresolvedField(name.to_string()))?;
                        result.push_str(&value_to_string(value));
                    }
                }
            }
            Ok(Value::String(result))
        }
    }
}

/// Resolve a raw value, recursing into mappings and lists.
pub fn resolve_value<S: FieldSource + ?Sized>(
    raw: &Value,
    source: &S,
) -> Result<Value, ResolveError> {
    match raw {
        Value::String(s) => resolve_template(s, source),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, source))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_value(value, source)?);
            }
            Ok(Value::Object(resolved))
        }
        literal => Ok(literal.clone()),
    }
}

/// Resolve every value of an attribute set.
pub fn resolve_fields<S: FieldSource + ?Sized>(
    raw: &Fields,
    source: &S,
) -> Result<Fields, ResolveError> {
    raw.iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, source)?)))
        .collect()
}

/// Check placeholder syntax throughout a raw value. On failure returns the
/// dotted path of the offending leaf along with the error.
pub fn check_value(raw: &Value) -> Result<(), (String, ResolveError)> {
    fn walk(value: &Value, path: &mut Vec<String>) -> Result<(), (String, ResolveError)> {
        match value {
            Value::String(s) => parse_template(s)
                .map(|_| ())
                .map_err(|e| (path.join("."), e)),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(i.to_string());
                    walk(item, path)?;
                    path.pop();
                }
                Ok(())
            }
            Value::Object(map) => {
                for (key, item) in map {
                    path.push(key.clone());
                    walk(item, path)?;
                    path.pop();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
    walk(raw, &mut Vec::new())
}

/// Field names referenced anywhere inside a raw value. Unparseable strings
/// contribute nothing.
pub fn referenced_fields(raw: &Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_references(raw, &mut names);
    names
}

fn collect_references(raw: &Value, names: &mut Vec<String>) {
    match raw {
        Value::String(s) => {
            if let Ok(template) = parse_template(s) {
                for name in template.field_names() {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, names)),
        _ => {}
    }
}
