//! `file` resource type: write, read and remove local files.

use crate::core::error::ActionError;
use crate::core::fields::Fields;
use crate::core::registry::Executor;
use crate::core::resource::{AttributeSpec, FieldKind, Resource, ResourceSchema};
use regex::Regex;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

pub const TYPE_KEY: &str = "file";

static MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0?[0-7]{3}$").expect("valid file mode pattern"));

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(
        vec![
            AttributeSpec::new("path", FieldKind::String),
            AttributeSpec::new("content", FieldKind::String),
            AttributeSpec::new("mode", FieldKind::String),
        ],
        vec!["path"],
    )
}

#[derive(Debug, Default)]
pub struct FileExecutor;

impl Executor for FileExecutor {
    fn actions(&self) -> &[&'static str] {
        &["write", "read", "remove"]
    }

    fn execute(&self, action: &str, resource: &mut Resource) -> Result<Fields, ActionError> {
        match action {
            "write" => write(resource),
            "read" => read(resource),
            "remove" => remove(resource),
            other => Err(ActionError::UnknownAction {
                action: other.to_string(),
                type_key: TYPE_KEY.to_string(),
            }),
        }
    }
}

fn io_error(context: String) -> impl FnOnce(std::io::Error) -> ActionError {
    move |source| ActionError::Io { context, source }
}

fn result(pairs: Vec<(&str, Value)>) -> Fields {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn write(resource: &Resource) -> Result<Fields, ActionError> {
    resource.require_attributes(&["path", "content"])?;
    let path = resource.str_attr("path")?;
    let content = resource.str_attr("content")?;
    let mode = resource.opt_str_attr("mode")?.map(parse_mode).transpose()?;

    let target = Path::new(path);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(io_error(format!("cannot create {}", parent.display())))?;
    }
    std::fs::write(target, content).map_err(io_error(format!("cannot write {}", path)))?;
    if let Some(mode) = mode {
        set_mode(target, mode)?;
    }
    tracing::debug!(path, bytes = content.len(), "file written");

    Ok(result(vec![
        ("path", json!(path)),
        ("bytes", json!(content.len())),
    ]))
}

fn read(resource: &Resource) -> Result<Fields, ActionError> {
    let path = resource.str_attr("path")?;
    let content =
        std::fs::read_to_string(path).map_err(io_error(format!("cannot read {}", path)))?;
    Ok(result(vec![("content", json!(content))]))
}

fn remove(resource: &Resource) -> Result<Fields, ActionError> {
    let path = resource.str_attr("path")?;
    let removed = match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(io_error(format!("cannot remove {}", path))(e)),
    };
    Ok(result(vec![("removed", json!(removed))]))
}

/// Octal permission string such as `644` or `0600`.
fn parse_mode(raw: &str) -> Result<u32, ActionError> {
    let invalid = || ActionError::InvalidAttribute {
        name: "mode".to_string(),
        expected: "an octal permission string such as \"0644\"",
    };
    if !MODE.is_match(raw) {
        return Err(invalid());
    }
    u32::from_str_radix(raw, 8).map_err(|_| invalid())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ActionError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(io_error(format!("cannot chmod {}", path.display())))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ActionError> {
    tracing::warn!("file mode is ignored on this platform");
    Ok(())
}
