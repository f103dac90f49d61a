//! Definition, task, and job types.
//!
//! Authored definitions and jobs are YAML documents; every type here derives
//! Serialize/Deserialize so they roundtrip through `serde_yaml_ng`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::fields::{FieldStore, Fields};

/// Separator between the action token and the resource-type tokens of a ref.
pub const REF_SEPARATOR: char = '_';

/// Action every resource type supports without executor involvement.
pub const NOTHING_ACTION: &str = "nothing";

// ============================================================================
// Authoring surface
// ============================================================================

/// An authored definition file, before compilation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DefinitionFile {
    /// Definition name, referenced by jobs
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered task declarations
    #[serde(default)]
    pub tasks: Vec<TaskDeclaration>,
}

/// One authored task: a ref and its raw parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskDeclaration {
    /// `<action>_<resource type>`, e.g. `run_shell`
    #[serde(rename = "ref")]
    pub reference: String,

    /// Parameters; values may be literals, `${name}` templates, or `$f:name` references
    #[serde(default)]
    pub params: Value,
}

// ============================================================================
// Compiled definition
// ============================================================================

/// A compiled, immutable sequence of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<Task>,
}

/// One step of a definition. Params stay unresolved until execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Task {
    pub fn new(reference: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            reference: reference.into(),
            params,
        }
    }

    /// Params as an ordered attribute set.
    pub fn param_fields(&self) -> Fields {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A task ref split into its action and resource-type part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef<'a> {
    pub action: &'a str,
    pub resource_type: &'a str,
}

impl<'a> TaskRef<'a> {
    /// Split at the first separator. Every token must be non-empty ASCII
    /// alphanumerics or `-`, and there must be at least two.
    pub fn parse(reference: &'a str) -> Option<Self> {
        let (action, resource_type) = reference.split_once(REF_SEPARATOR)?;
        let tokens_ok = reference.split(REF_SEPARATOR).all(|t| {
            !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
        if !tokens_ok {
            return None;
        }
        Some(Self {
            action,
            resource_type,
        })
    }
}

impl fmt::Display for TaskRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.action, REF_SEPARATOR, self.resource_type)
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// A launch request: a definition name and initial fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub name: String,

    /// Name of the definition to run
    pub definition: String,

    /// Initial field store content
    #[serde(default)]
    pub fields: Fields,
}

impl Job {
    /// Fresh field store for one run of this job.
    pub fn initial_store(&self) -> FieldStore {
        FieldStore::from(self.fields.clone())
    }
}

// ============================================================================
// Task lifecycle
// ============================================================================

/// Stages of the per-task execution contract that can fail, in order.
/// Building the resource and merging its attributes back cannot fail, so a
/// task that clears `Execute` always reaches the merged state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Dispatch,
    Resolve,
    Validate,
    Execute,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch => write!(f, "dispatch"),
            Self::Resolve => write!(f, "resolve"),
            Self::Validate => write!(f, "validate"),
            Self::Execute => write!(f, "execute"),
        }
    }
}
