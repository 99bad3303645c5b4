use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;
use crate::task::TaskDef;

fn default_version() -> String {
  "v1".to_string()
}

/// A workflow blueprint as submitted by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintDef {
  pub workflow_name: String,
  #[serde(default = "default_version")]
  pub version: String,
  pub tasks: Vec<TaskDef>,
}

impl BlueprintDef {
  /// Identity key for the workflow, stable across runs.
  pub fn wf_key(&self) -> String {
    format!("{}:{}", self.workflow_name, self.version)
  }

  /// Parse a blueprint from JSON text.
  pub fn from_json(text: &str) -> Result<Self, BlueprintError> {
    Self::from_value(serde_json::from_str(text)?)
  }

  /// Parse a blueprint from an already-decoded JSON value.
  ///
  /// A document whose `tasks` field is missing or not an array is rejected
  /// before deserialization so the error names the actual problem.
  pub fn from_value(value: serde_json::Value) -> Result<Self, BlueprintError> {
    match value.get("tasks") {
      Some(serde_json::Value::Array(_)) => {}
      _ => return Err(BlueprintError::MissingTasks),
    }
    Ok(serde_json::from_value(value)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_version_defaults_to_v1() {
    let def = BlueprintDef::from_json(
      r#"{ "workflow_name": "demo", "tasks": [
        { "id": "a", "type": "SHELL", "command": "true" }
      ]}"#,
    )
    .unwrap();

    assert_eq!(def.version, "v1");
    assert_eq!(def.wf_key(), "demo:v1");
  }

  #[test]
  fn test_missing_tasks_is_rejected() {
    let err = BlueprintDef::from_json(r#"{ "workflow_name": "demo" }"#).unwrap_err();
    assert!(matches!(err, BlueprintError::MissingTasks));
  }

  #[test]
  fn test_tasks_must_be_an_array() {
    let err =
      BlueprintDef::from_json(r#"{ "workflow_name": "demo", "tasks": {} }"#).unwrap_err();
    assert!(matches!(err, BlueprintError::MissingTasks));
  }

  #[test]
  fn test_malformed_json_is_rejected() {
    let err = BlueprintDef::from_json("{ not json").unwrap_err();
    assert!(matches!(err, BlueprintError::Parse(_)));
  }
}
