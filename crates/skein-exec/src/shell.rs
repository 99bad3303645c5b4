//! Shell task execution.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::ExecFailure;

/// Run `command` through `sh -c` with `cwd` as the working directory.
///
/// Returns stdout with trailing whitespace trimmed. A non-zero exit carries
/// the trimmed stderr.
pub(crate) async fn run(command: &str, cwd: &Path) -> Result<serde_json::Value, ExecFailure> {
  debug!(command, cwd = %cwd.display(), "running shell task");

  let output = Command::new("sh")
    .arg("-c")
    .arg(command)
    .current_dir(cwd)
    .output()
    .await
    .map_err(ExecFailure::Spawn)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    return Err(ExecFailure::ShellExit {
      status: output.status,
      stderr,
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout)
    .trim_end()
    .to_string();
  Ok(serde_json::Value::String(stdout))
}
