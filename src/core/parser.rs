//! Definition compiler and job loading.
//!
//! Parses authored YAML and checks structural constraints:
//! - Definition name must not be empty
//! - Every ref must be `<action>_<type>`
//! - Params must be a mapping (or omitted)
//! - Placeholder syntax must be well formed
//!
//! Nothing is resolved here: placeholders may name fields that only exist
//! once earlier tasks of the same run have executed.

use super::error::DefinitionError;
use super::resolver;
use super::types::*;
use serde_json::Value;
use std::path::Path;

/// Parse and compile a definition file from disk.
pub fn parse_definition_file(path: &Path) -> Result<Definition, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_definition(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Parse and compile a definition from a YAML (or JSON) string.
pub fn parse_definition(yaml: &str) -> Result<Definition, DefinitionError> {
    let file: DefinitionFile =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    compile(file)
}

/// Compile authored declarations into an immutable definition.
pub fn compile(file: DefinitionFile) -> Result<Definition, DefinitionError> {
    if file.name.trim().is_empty() {
        return Err(DefinitionError::EmptyName);
    }

    let mut tasks = Vec::with_capacity(file.tasks.len());
    for (index, decl) in file.tasks.into_iter().enumerate() {
        tasks.push(compile_task(index, decl)?);
    }

    tracing::debug!(definition = %file.name, tasks = tasks.len(), "compiled definition");
    Ok(Definition {
        name: file.name,
        description: file.description,
        tasks,
    })
}

fn compile_task(index: usize, decl: TaskDeclaration) -> Result<Task, DefinitionError> {
    let TaskDeclaration { reference, params } = decl;

    if TaskRef::parse(&reference).is_none() {
        return Err(DefinitionError::MalformedRef { index, reference });
    }

    let params = match params {
        Value::Null => serde_json::Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(DefinitionError::ParamsNotMapping {
                index,
                reference,
                found: super::fields::kind_name(&other),
            })
        }
    };

    for (name, value) in &params {
        if let Err((path, source)) = resolver::check_value(value) {
            let path = if path.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", name, path)
            };
            return Err(DefinitionError::Template {
                index,
                reference,
                path,
                source,
            });
        }
    }

    Ok(Task { reference, params })
}

/// Parse a job file from disk.
pub fn parse_job_file(path: &Path) -> Result<Job, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_job(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Parse a job from a YAML string.
pub fn parse_job(yaml: &str) -> Result<Job, String> {
    let job: Job = serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
    if job.name.trim().is_empty() {
        return Err("job name must not be empty".to_string());
    }
    if job.definition.trim().is_empty() {
        return Err("job definition must not be empty".to_string());
    }
    Ok(job)
}

/// Parse a `key=value` CLI override. The value is read as a YAML scalar or
/// flow collection, so `3` is a number and `[a, b]` a list.
pub fn parse_field_override(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", raw));
    }
    let value: Value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml_ng::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResolveError;
    use serde_json::json;

    #[test]
    fn test_compile_valid() {
        let yaml = r#"
name: provision
tasks:
  - ref: connect_ssh
    params:
      host: "${host}"
      user: "${user}"
      tags: "$f:taglist"
  - ref: nothing_ssh
"#;
        let def = parse_definition(yaml).unwrap();
        assert_eq!(def.name, "provision");
        assert_eq!(def.tasks.len(), 2);
        // Placeholders are kept verbatim.
        assert_eq!(def.tasks[0].params["host"], json!("${host}"));
        assert_eq!(def.tasks[0].params["tags"], json!("$f:taglist"));
        assert!(def.tasks[1].params.is_empty());
    }

    #[test]
    fn test_compile_preserves_order_and_literals() {
        let yaml = r#"
name: order
tasks:
  - ref: b_x
    params: {z: 1, a: [1, 2], m: {k: true}}
  - ref: a_x
"#;
        let def = parse_definition(yaml).unwrap();
        let refs: Vec<_> = def.tasks.iter().map(|t| t.reference.as_str()).collect();
        assert_eq!(refs, vec!["b_x", "a_x"]);
        let keys: Vec<_> = def.tasks[0].params.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(def.tasks[0].params["m"], json!({"k": true}));
    }

    #[test]
    fn test_compile_malformed_ref() {
        let yaml = "name: x\ntasks:\n  - ref: connect\n";
        let err = parse_definition(yaml).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::MalformedRef {
                index: 0,
                reference: "connect".to_string()
            }
        );
    }

    #[test]
    fn test_compile_params_not_mapping() {
        let yaml = "name: x\ntasks:\n  - ref: run_shell\n    params: [a, b]\n";
        let err = parse_definition(yaml).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::ParamsNotMapping { found: "list", .. }
        ));
    }

    #[test]
    fn test_compile_misplaced_field_ref() {
        let yaml = r#"
name: x
tasks:
  - ref: run_shell
    params:
      env:
        TAGS: "tags are $f:taglist"
"#;
        match parse_definition(yaml).unwrap_err() {
            DefinitionError::Template { path, source, .. } => {
                assert_eq!(path, "env.TAGS");
                assert!(matches!(source, ResolveError::MisplacedFieldRef(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_compile_unclosed_placeholder() {
        let yaml = "name: x\ntasks:\n  - ref: run_shell\n    params:\n      command: \"echo ${host\"\n";
        assert!(matches!(
            parse_definition(yaml).unwrap_err(),
            DefinitionError::Template {
                source: ResolveError::Unclosed(_),
                ..
            }
        ));
    }

    #[test]
    fn test_compile_empty_name() {
        let yaml = "name: \"  \"\ntasks: []\n";
        assert_eq!(parse_definition(yaml).unwrap_err(), DefinitionError::EmptyName);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(matches!(
            parse_definition("not: [valid: yaml: {{"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_definition_json() {
        let json = r#"{"name": "j", "tasks": [{"ref": "run_shell", "params": {"command": "true"}}]}"#;
        let def = parse_definition(json).unwrap();
        assert_eq!(def.tasks[0].reference, "run_shell");
    }

    #[test]
    fn test_parse_definition_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("definition.yaml");
        std::fs::write(&path, "name: file-test\ntasks: []\n").unwrap();
        let def = parse_definition_file(&path).unwrap();
        assert_eq!(def.name, "file-test");
    }

    #[test]
    fn test_parse_definition_file_missing() {
        let err = parse_definition_file(Path::new("/nonexistent/definition.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_parse_job() {
        let job = parse_job("name: j1\ndefinition: provision\nfields:\n  host: db1\n").unwrap();
        assert_eq!(job.definition, "provision");
        assert_eq!(job.fields["host"], json!("db1"));
        assert!(parse_job("name: j1\ndefinition: \"\"\n").is_err());
    }

    #[test]
    fn test_parse_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, "name: j\ndefinition: d\n").unwrap();
        let job = parse_job_file(&path).unwrap();
        assert!(job.fields.is_empty());
    }

    #[test]
    fn test_field_override_types() {
        assert_eq!(parse_field_override("port=5432").unwrap(), ("port".to_string(), json!(5432)));
        assert_eq!(parse_field_override("ok=true").unwrap(), ("ok".to_string(), json!(true)));
        assert_eq!(
            parse_field_override("tags=[a, b]").unwrap(),
            ("tags".to_string(), json!(["a", "b"]))
        );
        assert_eq!(
            parse_field_override("url=pg://db1:5432/app").unwrap(),
            ("url".to_string(), json!("pg://db1:5432/app"))
        );
        assert_eq!(parse_field_override("empty=").unwrap().1, json!(""));
        assert!(parse_field_override("novalue").is_err());
        assert!(parse_field_override("=x").is_err());
    }
}
