use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowStatus {
  Pending,
  Running,
  Paused,
  Completed,
  Failed,
}

impl WorkflowStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkflowStatus::Pending => "PENDING",
      WorkflowStatus::Running => "RUNNING",
      WorkflowStatus::Paused => "PAUSED",
      WorkflowStatus::Completed => "COMPLETED",
      WorkflowStatus::Failed => "FAILED",
    }
  }
}

impl fmt::Display for WorkflowStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WorkflowStatus {
  type Err = StoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(WorkflowStatus::Pending),
      "RUNNING" => Ok(WorkflowStatus::Running),
      "PAUSED" => Ok(WorkflowStatus::Paused),
      "COMPLETED" => Ok(WorkflowStatus::Completed),
      "FAILED" => Ok(WorkflowStatus::Failed),
      other => Err(StoreError::InvalidStatus(other.to_string())),
    }
  }
}

/// Lifecycle status of a single task.
///
/// PENDING doubles as the terminal status of a task blocked by a failed
/// ancestor: it was never started in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl TaskStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::Pending => "PENDING",
      TaskStatus::Running => "RUNNING",
      TaskStatus::Completed => "COMPLETED",
      TaskStatus::Failed => "FAILED",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = StoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(TaskStatus::Pending),
      "RUNNING" => Ok(TaskStatus::Running),
      "COMPLETED" => Ok(TaskStatus::Completed),
      "FAILED" => Ok(TaskStatus::Failed),
      other => Err(StoreError::InvalidStatus(other.to_string())),
    }
  }
}

/// Named outputs of one task, as propagated to descendants and cached.
pub type TaskOutputs = HashMap<String, serde_json::Value>;

/// A cached task result keyed by `(workflow, task)`.
///
/// `config_hash` is the fingerprint of the resolved task descriptor that
/// produced `outputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub outputs: TaskOutputs,
  pub config_hash: String,
}

/// Event envelope published on a workflow's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  WorkflowUpdate {
    status: WorkflowStatus,
  },
  TaskUpdate {
    task_id: String,
    status: TaskStatus,
  },
  /// Leaf-task outputs, sent by the control session once a workflow
  /// completes.
  WorkflowOutput {
    outputs: HashMap<String, serde_json::Value>,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_wire_format_is_uppercase() {
    assert_eq!(
      serde_json::to_value(WorkflowStatus::Paused).unwrap(),
      json!("PAUSED")
    );
    assert_eq!(
      serde_json::to_value(TaskStatus::Completed).unwrap(),
      json!("COMPLETED")
    );
  }

  #[test]
  fn test_status_round_trips_through_as_str() {
    for status in [
      WorkflowStatus::Pending,
      WorkflowStatus::Running,
      WorkflowStatus::Paused,
      WorkflowStatus::Completed,
      WorkflowStatus::Failed,
    ] {
      assert_eq!(status.as_str().parse::<WorkflowStatus>().unwrap(), status);
    }
  }

  #[test]
  fn test_event_envelope_shape() {
    let event = Event::TaskUpdate {
      task_id: "build".to_string(),
      status: TaskStatus::Running,
    };
    assert_eq!(
      serde_json::to_value(&event).unwrap(),
      json!({ "type": "task_update", "task_id": "build", "status": "RUNNING" })
    );

    let event = Event::WorkflowUpdate {
      status: WorkflowStatus::Completed,
    };
    assert_eq!(
      serde_json::to_value(&event).unwrap(),
      json!({ "type": "workflow_update", "status": "COMPLETED" })
    );
  }
}
