use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Why a task execution failed.
#[derive(Debug, Error)]
pub enum ExecFailure {
  #[error("failed to spawn shell: {0}")]
  Spawn(#[source] std::io::Error),

  #[error("shell command failed ({status}): {stderr}")]
  ShellExit { status: ExitStatus, stderr: String },

  #[error("invalid HTTP method '{0}'")]
  Method(String),

  #[error("invalid header '{name}': {message}")]
  Header { name: String, message: String },

  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("http status {status}: {body}")]
  HttpStatus {
    status: reqwest::StatusCode,
    body: String,
  },

  #[error("failed to write response dump '{path}': {source}")]
  Dump {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("smtp credentials missing: set SENDER_EMAIL and APP_PASSWORD")]
  SmtpCredentials,

  #[error("smtp transport error: {0}")]
  Smtp(#[from] lettre::transport::smtp::Error),

  #[error("invalid sender address '{address}': {source}")]
  SenderAddress {
    address: String,
    #[source]
    source: lettre::address::AddressError,
  },

  #[error("failed to build email message: {0}")]
  Message(#[from] lettre::error::Error),
}

/// A task execution failed.
///
/// Carries the task id so the engine can report the failure and block the
/// task's descendants without unwinding.
#[derive(Debug, Error)]
#[error("task '{task_id}' failed: {kind}")]
pub struct TaskExecutionError {
  pub task_id: String,
  pub kind: ExecFailure,
}
