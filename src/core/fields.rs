//! Field store (ordered per-run state accumulated across tasks) and deep-merge.
//!
//! Deep-merge recurses key by key while both sides are mappings; otherwise the
//! overlay (higher precedence) side wins. Lists are replaced, never concatenated.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered key→value map of field values.
pub type Fields = IndexMap<String, Value>;

/// Per-run field state. Created from a job's initial fields and replaced
/// wholesale after every successful task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldStore {
    fields: Fields,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field. `null` counts as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Set a field (last write wins, original position kept).
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn as_fields(&self) -> &Fields {
        &self.fields
    }

    /// Return a copy with `overlay` deep-merged over this store.
    pub fn merged(&self, overlay: &Fields) -> FieldStore {
        let mut fields = self.fields.clone();
        merge_fields(&mut fields, overlay);
        FieldStore { fields }
    }
}

impl From<Fields> for FieldStore {
    fn from(fields: Fields) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for FieldStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Deep-merge `overlay` into `base`, overlay winning on conflicts.
pub fn merge_fields(base: &mut Fields, overlay: &Fields) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Deep-merge a single value.
pub fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Human name of a value's wire type.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
