//! Plan generation: dispatch every task of a definition against a registry
//! without executing anything.
//!
//! Reports, per task, the action and resource type it dispatches to, the
//! fields its params read, and any dispatch problem (unknown or ambiguous
//! type, undeclared action).

use super::registry::Registry;
use super::resolver;
use super::types::{Definition, NOTHING_ACTION};
use serde_json::Value;

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub index: usize,
    pub reference: String,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    /// Fields read by the params' placeholders, in order of appearance
    pub reads: Vec<String>,
    pub problem: Option<String>,
}

impl PlannedStep {
    pub fn is_ok(&self) -> bool {
        self.problem.is_none()
    }

    /// One-line human description.
    pub fn describe(&self) -> String {
        let target = match (&self.action, &self.resource_type) {
            (Some(action), Some(ty)) if action == NOTHING_ACTION => format!("{} (no-op)", ty),
            (Some(action), Some(ty)) => format!("{} → {}", ty, action),
            _ => "?".to_string(),
        };
        let reads = if self.reads.is_empty() {
            String::new()
        } else {
            format!(" reads [{}]", self.reads.join(", "))
        };
        format!("{}: {}{}", self.reference, target, reads)
    }
}

/// Full dispatch plan for a definition.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub name: String,
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    pub fn problems(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|s| !s.is_ok())
    }

    pub fn is_dispatchable(&self) -> bool {
        self.steps.iter().all(PlannedStep::is_ok)
    }
}

/// Build a dispatch plan for `definition`.
pub fn plan(definition: &Definition, registry: &Registry) -> ExecutionPlan {
    let steps = definition
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let reads = resolver::referenced_fields(&Value::Object(task.params.clone()));
            match registry.lookup(&task.reference) {
                Ok(dispatch) => {
                    let problem = if dispatch.entry.supports(&dispatch.action) {
                        None
                    } else {
                        Some(format!(
                            "resource type '{}' has no action '{}'",
                            dispatch.entry.type_key(),
                            dispatch.action
                        ))
                    };
                    PlannedStep {
                        index,
                        reference: task.reference.clone(),
                        action: Some(dispatch.action.clone()),
                        resource_type: Some(dispatch.entry.type_key().to_string()),
                        reads,
                        problem,
                    }
                }
                Err(e) => PlannedStep {
                    index,
                    reference: task.reference.clone(),
                    action: None,
                    resource_type: None,
                    reads,
                    problem: Some(e.to_string()),
                },
            }
        })
        .collect();

    ExecutionPlan {
        name: definition.name.clone(),
        steps,
    }
}

/// Pre-flight check: the problems [`plan`] finds, as messages.
pub fn check_definition(definition: &Definition, registry: &Registry) -> Vec<String> {
    plan(definition, registry)
        .problems()
        .map(|s| {
            format!(
                "task {} ({}): {}",
                s.index,
                s.reference,
                s.problem.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ActionError;
    use crate::core::fields::Fields;
    use crate::core::parser::parse_definition;
    use crate::core::registry::Executor;
    use crate::core::resource::{Resource, ResourceSchema};
    use std::sync::Arc;

    struct Ssh;

    impl Executor for Ssh {
        fn actions(&self) -> &[&'static str] {
            &["connect"]
        }

        fn execute(&self, _action: &str, _r: &mut Resource) -> Result<Fields, ActionError> {
            Ok(Fields::new())
        }
    }

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.register("ssh", Arc::new(Ssh), ResourceSchema::open()).unwrap();
        b.build()
    }

    #[test]
    fn test_plan_dispatches_each_task() {
        let def = parse_definition(
            r#"
name: p
tasks:
  - ref: connect_ssh
    params: {host: "${host}", tags: "$f:taglist", note: "${host}"}
  - ref: nothing_ssh
"#,
        )
        .unwrap();
        let plan = plan(&def, &registry());
        assert!(plan.is_dispatchable());
        assert_eq!(plan.steps[0].action.as_deref(), Some("connect"));
        assert_eq!(plan.steps[0].resource_type.as_deref(), Some("ssh"));
        assert_eq!(plan.steps[0].reads, vec!["host", "taglist"]);
        assert_eq!(plan.steps[0].describe(), "connect_ssh: ssh → connect reads [host, taglist]");
        assert_eq!(plan.steps[1].describe(), "nothing_ssh: ssh (no-op)");
    }

    #[test]
    fn test_check_definition_problems() {
        let def = parse_definition(
            r#"
name: p
tasks:
  - ref: destroy_ssh
  - ref: create_bucket
  - ref: connect_ssh
"#,
        )
        .unwrap();
        let problems = check_definition(&def, &registry());
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("task 0 (destroy_ssh)"));
        assert!(problems[0].contains("no action 'destroy'"));
        assert!(problems[1].contains("no registered resource type"));
    }
}
