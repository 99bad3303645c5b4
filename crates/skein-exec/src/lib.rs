//! Task executors for skein workflows.
//!
//! An executor takes a *resolved* task descriptor (placeholders already
//! substituted) and produces the task's raw output as a JSON value:
//! - SHELL: trimmed stdout as a string,
//! - RESTAPI: the parsed response body, or the raw text when it is not JSON,
//! - EMAIL: a success sentinel once every recipient was attempted.
//!
//! Executors never touch scheduling state; failures surface as
//! [`TaskExecutionError`] values carrying the task id, which the engine
//! contains as task-FAILED state.

mod email;
mod error;
mod rest;
mod shell;

use std::path::Path;

use skein_blueprint::{TaskDef, TaskKind};

pub use email::SmtpSettings;
pub use error::{ExecFailure, TaskExecutionError};

/// Dispatches resolved tasks to the adapter for their type.
///
/// Holds the shared HTTP client; shell and email adapters are stateless.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
  http: reqwest::Client,
}

impl TaskExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Execute a resolved task with `base_dir` as its working directory,
  /// returning the raw output.
  pub async fn execute(
    &self,
    task: &TaskDef,
    base_dir: &Path,
  ) -> Result<serde_json::Value, TaskExecutionError> {
    let result = match &task.kind {
      TaskKind::Shell { command } => shell::run(command, base_dir).await,
      TaskKind::RestApi {
        method,
        url,
        headers,
        body,
      } => {
        rest::run(
          &self.http,
          method,
          url,
          headers,
          body.as_ref(),
          &task.outputs,
          base_dir,
        )
        .await
      }
      TaskKind::Email {
        subject,
        email_body,
        recipients,
      } => email::run(subject, email_body, recipients).await,
    };

    result.map_err(|kind| TaskExecutionError {
      task_id: task.id.clone(),
      kind,
    })
  }
}
