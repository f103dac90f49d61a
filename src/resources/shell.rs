//! `shell` resource type: run a command through local `bash`.

use crate::core::error::ActionError;
use crate::core::fields::Fields;
use crate::core::registry::Executor;
use crate::core::resolver::value_to_string;
use crate::core::resource::{AttributeSpec, FieldKind, Resource, ResourceSchema};
use crate::transport::{exec_local, trim_trailing_newline, ExecRequest};
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::LazyLock;

pub const TYPE_KEY: &str = "shell";

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name pattern"));

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(
        vec![
            AttributeSpec::new("command", FieldKind::String),
            AttributeSpec::new("cwd", FieldKind::String),
            AttributeSpec::new("env", FieldKind::Mapping),
        ],
        vec!["command"],
    )
}

#[derive(Debug, Default)]
pub struct ShellExecutor;

impl Executor for ShellExecutor {
    fn actions(&self) -> &[&'static str] {
        &["run"]
    }

    fn execute(&self, action: &str, resource: &mut Resource) -> Result<Fields, ActionError> {
        match action {
            "run" => run(resource),
            other => Err(ActionError::UnknownAction {
                action: other.to_string(),
                type_key: TYPE_KEY.to_string(),
            }),
        }
    }
}

fn run(resource: &Resource) -> Result<Fields, ActionError> {
    let command = resource.str_attr("command")?;
    let cwd = resource.opt_str_attr("cwd")?;
    let env = env_pairs(resource)?;

    let request = ExecRequest {
        script: command,
        cwd: cwd.map(Path::new),
        env,
    };
    let out = exec_local(&request).map_err(|source| ActionError::Io {
        context: format!("failed to run command in {}", cwd.unwrap_or(".")),
        source,
    })?;
    tracing::debug!(exit_code = out.exit_code, "shell command finished");

    let stderr = trim_trailing_newline(&out.stderr).to_string();
    if !out.success() {
        return Err(ActionError::CommandFailed {
            exit_code: out.exit_code,
            stderr,
        });
    }

    Ok([
        ("stdout", json!(trim_trailing_newline(&out.stdout))),
        ("stderr", json!(stderr)),
        ("exit_code", json!(out.exit_code)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect())
}

/// `env` mapping as process environment pairs; scalar values are stringified.
fn env_pairs(resource: &Resource) -> Result<Vec<(String, String)>, ActionError> {
    let env = match resource.opt_attr("env", FieldKind::Mapping, "a mapping")? {
        Some(Value::Object(map)) => map,
        _ => return Ok(Vec::new()),
    };

    let mut pairs = Vec::with_capacity(env.len());
    for (name, value) in env {
        if !ENV_NAME.is_match(name) {
            return Err(ActionError::InvalidAttribute {
                name: format!("env.{}", name),
                expected: "a valid environment variable name",
            });
        }
        pairs.push((name.clone(), value_to_string(value)));
    }
    Ok(pairs)
}
