//! Execution contract for one task, and the sequential runner.
//!
//! Per task: dispatch, resolve the params against the field snapshot, build
//! the resource (snapshot overlaid by resolved params), validate, execute and
//! merge. A failed task never touches the field store it was given.
//!
//! The runner drives a definition's tasks strictly in order and stops at the
//! first failure.

use super::error::{ActionError, TaskError};
use super::fields::{merge_fields, FieldStore, Fields};
use super::registry::Registry;
use super::resolver;
use super::resource::Resource;
use super::types::*;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A task that reached the merged state.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Field store after merging the task's attributes
    pub fields: FieldStore,
    /// Final resource, including the action's result attributes
    pub resource: Resource,
    pub action: String,
    pub duration: Duration,
}

/// A task that failed, with the stage it failed in and the resource, when one
/// had been built, so callers can inspect its error list.
#[derive(Debug, Error)]
#[error("{reference} failed during {stage}: {error}")]
pub struct TaskFailure {
    pub reference: String,
    pub stage: TaskStage,
    #[source]
    pub error: TaskError,
    pub resource: Option<Resource>,
}

impl TaskFailure {
    fn new(task: &Task, stage: TaskStage, error: TaskError, resource: Option<Resource>) -> Self {
        Self {
            reference: task.reference.clone(),
            stage,
            error,
            resource,
        }
    }
}

/// Run one task against a field snapshot.
///
/// `fields` is only read; on success the outcome carries the merged store.
pub fn run_task(
    registry: &Registry,
    task: &Task,
    fields: &FieldStore,
) -> Result<TaskOutcome, Box<TaskFailure>> {
    let start = Instant::now();
    let reference = task.reference.as_str();

    let dispatch = registry
        .lookup(reference)
        .map_err(|e| fail(task, TaskStage::Dispatch, e.into(), None))?;
    let entry = dispatch.entry;
    let action = dispatch.action;
    tracing::debug!(task = reference, %action, resource_type = entry.type_key(), "dispatched");

    // Only params are templates; stored values are data and pass through.
    let params = task.param_fields();
    let supplied: Vec<String> = params.keys().cloned().collect();
    let mut attributes = fields.as_fields().clone();
    let resolved = match resolver::resolve_fields(&params, fields) {
        Ok(resolved) => resolved,
        Err(e) => {
            merge_fields(&mut attributes, &params);
            let resource = Resource::new(entry.type_key(), attributes).with_supplied(supplied);
            return Err(fail(task, TaskStage::Resolve, e.into(), Some(resource)));
        }
    };
    merge_fields(&mut attributes, &resolved);
    let mut resource = Resource::new(entry.type_key(), attributes).with_supplied(supplied);
    tracing::debug!(task = reference, attributes = resource.attributes.len(), "resolved");

    if !resource.validate(entry.schema()) {
        let error = TaskError::Validation {
            reference: reference.to_string(),
            errors: resource.errors.clone(),
        };
        return Err(fail(task, TaskStage::Validate, error, Some(resource)));
    }
    tracing::debug!(task = reference, "validated");

    let result = if action == NOTHING_ACTION {
        Ok(Fields::new())
    } else if !entry.supports(&action) {
        Err(ActionError::UnknownAction {
            action: action.clone(),
            type_key: entry.type_key().to_string(),
        })
    } else {
        entry.executor().execute(&action, &mut resource)
    };

    let result = match result {
        Ok(result) => result,
        Err(source) => {
            resource.record_exception(&source);
            let error = TaskError::ActionExecution {
                reference: reference.to_string(),
                action,
                source,
            };
            return Err(fail(task, TaskStage::Execute, error, Some(resource)));
        }
    };
    tracing::debug!(task = reference, results = result.len(), "executed");

    merge_fields(&mut resource.attributes, &result);
    let merged = fields.merged(&resource.attributes);
    let duration = start.elapsed();
    tracing::info!(
        task = reference,
        %action,
        resource_type = entry.type_key(),
        fields = merged.len(),
        elapsed_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        "task merged"
    );

    Ok(TaskOutcome {
        fields: merged,
        resource,
        action,
        duration,
    })
}

fn fail(
    task: &Task,
    stage: TaskStage,
    error: TaskError,
    resource: Option<Resource>,
) -> Box<TaskFailure> {
    tracing::warn!(task = %task.reference, %stage, error = %error, "task failed");
    Box::new(TaskFailure::new(task, stage, error, resource))
}

// ============================================================================
// Sequential runner
// ============================================================================

/// Result of running every task of a definition.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub definition: String,
    pub tasks_completed: usize,
    pub fields: FieldStore,
    pub total_duration: Duration,
}

/// Why a run stopped.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("job '{job}' targets definition '{expected}', not '{found}'")]
    DefinitionMismatch {
        job: String,
        expected: String,
        found: String,
    },

    #[error("task {index} of '{definition}': {failure}")]
    Task {
        definition: String,
        index: usize,
        completed: usize,
        /// Field store as it was before the failing task
        fields: FieldStore,
        #[source]
        failure: Box<TaskFailure>,
    },
}

/// Run a job: check it targets `definition`, then run from its fields.
pub fn run_job(registry: &Registry, definition: &Definition, job: &Job) -> Result<RunResult, RunError> {
    if job.definition != definition.name {
        return Err(RunError::DefinitionMismatch {
            job: job.name.clone(),
            expected: job.definition.clone(),
            found: definition.name.clone(),
        });
    }
    tracing::info!(job = %job.name, definition = %definition.name, "job started");
    run_definition(registry, definition, job.initial_store())
}

/// Run every task in order, threading the field store through.
pub fn run_definition(
    registry: &Registry,
    definition: &Definition,
    initial: FieldStore,
) -> Result<RunResult, RunError> {
    let start = Instant::now();
    let mut fields = initial;

    for (index, task) in definition.tasks.iter().enumerate() {
        match run_task(registry, task, &fields) {
            Ok(outcome) => fields = outcome.fields,
            Err(failure) => {
                return Err(RunError::Task {
                    definition: definition.name.clone(),
                    index,
                    completed: index,
                    fields,
                    failure,
                })
            }
        }
    }

    Ok(RunResult {
        definition: definition.name.clone(),
        tasks_completed: definition.tasks.len(),
        fields,
        total_duration: start.elapsed(),
    })
}
