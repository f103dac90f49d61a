//! CLI subcommands: init, validate, plan, run, types, schema, completions.

use crate::core::executor::{self, RunError, RunResult};
use crate::core::fields::Fields;
use crate::core::registry::Registry;
use crate::core::types::{Definition, DefinitionFile, Job};
use crate::core::{parser, planner};
use crate::resources;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "provisio",
    version,
    about = "Run provisioning definitions: ordered tasks, templated params, typed resources"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter definition.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Compile a definition and check every ref dispatches
    Validate {
        /// Path to the definition
        #[arg(short, long, default_value = "definition.yaml")]
        file: PathBuf,
    },

    /// Show the action and resource type each task dispatches to
    Plan {
        /// Path to the definition
        #[arg(short, long, default_value = "definition.yaml")]
        file: PathBuf,
    },

    /// Run a definition's tasks in order on the local host
    Run {
        /// Path to the definition
        #[arg(short, long, default_value = "definition.yaml")]
        file: PathBuf,

        /// Job file providing the initial fields
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Set an initial field (repeatable), e.g. --field port=5432
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Format of the final field store
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },

    /// List registered resource types, their attributes and actions
    Types,

    /// Print the JSON Schema of definition files
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan { file } => cmd_plan(&file),
        Commands::Run {
            file,
            job,
            fields,
            output,
        } => cmd_run(&file, job.as_deref(), &fields, output),
        Commands::Types => cmd_types(),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn registry() -> Result<Registry, String> {
    resources::builtin_registry().map_err(|e| format!("cannot build registry: {}", e))
}

const STARTER: &str = r#"name: hello
description: "Starter definition"

tasks:
  - ref: run_shell
    params:
      command: "echo hello ${user}"

  - ref: write_file
    params:
      path: "${workdir}/greeting.txt"
      content: "${stdout}"
      mode: "0644"

  - ref: read_file
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let definition_path = path.join("definition.yaml");
    if definition_path.exists() {
        return Err(format!("{} already exists", definition_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&definition_path, STARTER)
        .map_err(|e| format!("cannot write {}: {}", definition_path.display(), e))?;

    println!("Initialized provisio definition at {}", path.display());
    println!("  Created: {}", definition_path.display());
    println!(
        "  Try: provisio run -f {} --field user=$USER --field workdir=/tmp",
        definition_path.display()
    );
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let definition = parser::parse_definition_file(file)?;
    let errors = planner::check_definition(&definition, &registry()?);

    if errors.is_empty() {
        println!("OK: {} ({} tasks)", definition.name, definition.tasks.len());
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_plan(file: &Path) -> Result<(), String> {
    let definition = parser::parse_definition_file(file)?;
    let plan = planner::plan(&definition, &registry()?);

    println!("Planning: {} ({} tasks)", plan.name, plan.steps.len());
    println!();
    for step in &plan.steps {
        match &step.problem {
            None => println!("  {}. {}", step.index + 1, step.describe()),
            Some(problem) => println!("  {}. {}: {}", step.index + 1, step.reference, problem),
        }
    }
    println!();

    let problems = plan.problems().count();
    if problems > 0 {
        return Err(format!("{} task(s) cannot be dispatched", problems));
    }
    Ok(())
}

/// The job to run: the job file if given, else an empty job named after the
/// definition. `--field` pairs override its fields.
fn build_job(
    definition: &Definition,
    job_file: Option<&Path>,
    overrides: &[String],
) -> Result<Job, String> {
    let mut job = match job_file {
        Some(path) => parser::parse_job_file(path)?,
        None => Job {
            name: definition.name.clone(),
            definition: definition.name.clone(),
            fields: Fields::new(),
        },
    };
    for raw in overrides {
        let (key, value) = parser::parse_field_override(raw)?;
        job.fields.insert(key, value);
    }
    Ok(job)
}

fn cmd_run(
    file: &Path,
    job_file: Option<&Path>,
    overrides: &[String],
    output: OutputFormat,
) -> Result<(), String> {
    let definition = parser::parse_definition_file(file)?;
    let registry = registry()?;
    let job = build_job(&definition, job_file, overrides)?;

    match executor::run_job(&registry, &definition, &job) {
        Ok(result) => {
            eprintln!(
                "Run complete: {} ({} tasks, {:.2}s)",
                result.definition,
                result.tasks_completed,
                result.total_duration.as_secs_f64()
            );
            println!("{}", render_fields(&result, output)?);
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            Err(e.to_string())
        }
    }
}

fn report_failure(error: &RunError) {
    let RunError::Task {
        index,
        completed,
        failure,
        ..
    } = error
    else {
        return;
    };
    eprintln!(
        "FAILED: task {} ({}) during {} after {} completed task(s)",
        index, failure.reference, failure.stage, completed
    );
    if let Some(resource) = &failure.resource {
        for e in &resource.errors {
            eprintln!("  ERROR: {}", e);
            for cause in &e.trace {
                eprintln!("    caused by: {}", cause);
            }
        }
    }
}

fn render_fields(result: &RunResult, output: OutputFormat) -> Result<String, String> {
    match output {
        OutputFormat::Yaml => serde_yaml_ng::to_string(&result.fields)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| format!("YAML serialize error: {}", e)),
        OutputFormat::Json => serde_json::to_string_pretty(&result.fields)
            .map_err(|e| format!("JSON serialize error: {}", e)),
    }
}

fn describe_types(registry: &Registry) -> String {
    let mut out = String::new();
    for entry in registry.entries() {
        let schema = entry.schema();
        out.push_str(&format!(
            "{}: actions [{}]\n",
            entry.type_key(),
            entry.executor().actions().join(", ")
        ));
        for attr in &schema.attributes {
            let marker = if schema.required.contains(&attr.name) {
                " (required)"
            } else {
                ""
            };
            out.push_str(&format!("  {}: {}{}\n", attr.name, attr.kind, marker));
        }
    }
    out
}

fn cmd_types() -> Result<(), String> {
    print!("{}", describe_types(&registry()?));
    Ok(())
}

fn definition_schema() -> Result<String, String> {
    let schema = schemars::schema_for!(DefinitionFile);
    serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON serialize error: {}", e))
}

fn cmd_schema() -> Result<(), String> {
    println!("{}", definition_schema()?);
    Ok(())
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, out);
}
