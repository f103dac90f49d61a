//! Local execution through `bash`.

use super::ExecOutput;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// A script plus the process context to run it in.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest<'a> {
    pub script: &'a str,
    pub cwd: Option<&'a Path>,
    pub env: Vec<(String, String)>,
}

impl<'a> ExecRequest<'a> {
    pub fn new(script: &'a str) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }
}

/// Execute a script locally via `bash`, feeding it on stdin.
/// Uses bash (not sh/dash) so scripts may rely on `set -o pipefail`.
pub fn exec_local(request: &ExecRequest<'_>) -> std::io::Result<ExecOutput> {
    let mut command = Command::new("bash");
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = request.cwd {
        command.current_dir(cwd);
    }
    command.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    tracing::trace!(script = request.script, "spawning bash");
    let mut child = command.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(request.script.as_bytes())?;
    }

    let output = child.wait_with_output()?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
