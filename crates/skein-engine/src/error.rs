use std::path::PathBuf;

use skein_blueprint::{BlueprintError, CycleError};
use skein_exec::TaskExecutionError;
use skein_store::StoreError;
use thiserror::Error;

/// Errors that abort engine construction or a driver.
///
/// Task-level failures are *not* here: they are contained by the drivers as
/// [`TaskFailure`] and reported through task status, never propagated.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Blueprint(#[from] BlueprintError),

  #[error(transparent)]
  Cycle(#[from] CycleError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to create run directory '{path}': {source}")]
  RunDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("worker task panicked: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// Why a task was marked FAILED.
#[derive(Debug, Error)]
pub enum TaskFailure {
  #[error(transparent)]
  Execution(#[from] TaskExecutionError),

  #[error("task '{task_id}' body is no longer valid JSON after substitution: {source}")]
  ResolvedBody {
    task_id: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("task '{task_id}' output '{output}' has an invalid JSONPath: {source}")]
  JsonPath {
    task_id: String,
    output: String,
    #[source]
    source: serde_json_path::ParseError,
  },
}
