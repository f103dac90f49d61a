//! Error taxonomy for compile, dispatch, resolution, validation and execution.

use thiserror::Error;

/// A malformed declaration, rejected at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("definition name must not be empty")]
    EmptyName,

    #[error("task {index}: malformed ref '{reference}' (expected <action>_<type>)")]
    MalformedRef { index: usize, reference: String },

    #[error("task {index} ({reference}): params must be a mapping, got {found}")]
    ParamsNotMapping {
        index: usize,
        reference: String,
        found: &'static str,
    },

    #[error("task {index} ({reference}): param '{path}': {source}")]
    Template {
        index: usize,
        reference: String,
        path: String,
        #[source]
        source: ResolveError,
    },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Registration and dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("resource type '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("invalid type key '{key}': {reason}")]
    InvalidTypeKey { key: String, reason: &'static str },

    #[error("malformed ref '{0}' (expected <action>_<type>)")]
    MalformedRef(String),

    #[error("no registered resource type matches ref '{0}'")]
    UnknownResourceType(String),

    #[error("ref '{reference}' is ambiguous between {}", .candidates.join(", "))]
    Ambiguous {
        reference: String,
        candidates: Vec<String>,
    },
}

/// Placeholder resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unresolved field '{0}'")]
    UnresolvedField(String),

    #[error("$f: reference must be the entire value, found in '{0}'")]
    MisplacedFieldRef(String),

    #[error("unclosed placeholder at position {0}")]
    Unclosed(usize),

    #[error("empty placeholder name")]
    EmptyName,
}

/// Failures raised by an executor while performing an action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{}", missing_message(.0))]
    MissingAttributes(Vec<String>),

    #[error("resource type '{type_key}' has no action '{action}'")]
    UnknownAction { action: String, type_key: String },

    #[error("attribute '{name}' must be {expected}")]
    InvalidAttribute { name: String, expected: &'static str },

    #[error("command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Grammatically joined "is/are required" message for missing attributes.
fn missing_message(names: &[String]) -> String {
    match names {
        [] => "no attributes are missing".to_string(),
        [one] => format!("{} is required for this operation", one),
        [init @ .., last] => format!(
            "{} and {} are required for this operation",
            init.join(", "),
            last
        ),
    }
}

/// A single task's failure, by the stage that raised it.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Dispatch(#[from] RegistryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("validation failed for '{reference}': {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation {
        reference: String,
        errors: Vec<super::resource::ResourceError>,
    },

    #[error("action '{action}' failed for '{reference}': {source}")]
    ActionExecution {
        reference: String,
        action: String,
        #[source]
        source: ActionError,
    },
}
