//! Projection of raw executor output into named task outputs.

use serde_json::Value;
use serde_json_path::JsonPath;
use skein_blueprint::{ExtractionSpec, TaskDef};
use skein_store::TaskOutputs;

use crate::error::TaskFailure;

/// Project `raw` into the task's named outputs.
///
/// - `json`: first JSONPath match against the raw output, null when none;
/// - `file`: the path string verbatim (the engine never reads the file);
/// - anything else: the raw output as-is.
pub fn extract_outputs(task: &TaskDef, raw: &Value) -> Result<TaskOutputs, TaskFailure> {
  let mut outputs = TaskOutputs::new();

  for (name, spec) in &task.outputs {
    let value = match spec {
      ExtractionSpec::Json { json_path } => {
        let path = JsonPath::parse(json_path).map_err(|source| TaskFailure::JsonPath {
          task_id: task.id.clone(),
          output: name.clone(),
          source,
        })?;
        path
          .query(raw)
          .all()
          .first()
          .map(|matched| (*matched).clone())
          .unwrap_or(Value::Null)
      }
      ExtractionSpec::File { path } => Value::String(path.clone()),
      ExtractionSpec::Raw => raw.clone(),
    };
    outputs.insert(name.clone(), value);
  }

  Ok(outputs)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn task_with_outputs(outputs: Value) -> TaskDef {
    serde_json::from_value(json!({
      "id": "t",
      "type": "SHELL",
      "command": "true",
      "outputs": outputs,
    }))
    .unwrap()
  }

  #[test]
  fn test_json_path_takes_first_match() {
    let task = task_with_outputs(json!({
      "first_name": { "type": "json", "json_path": "$.users[*].name" }
    }));
    let raw = json!({ "users": [ { "name": "ada" }, { "name": "grace" } ] });

    let outputs = extract_outputs(&task, &raw).unwrap();
    assert_eq!(outputs["first_name"], json!("ada"));
  }

  #[test]
  fn test_json_path_without_match_is_null() {
    let task = task_with_outputs(json!({
      "missing": { "type": "json", "json_path": "$.nope" }
    }));
    let raw = json!({ "users": [] });

    let outputs = extract_outputs(&task, &raw).unwrap();
    assert_eq!(outputs["missing"], Value::Null);
  }

  #[test]
  fn test_root_path_matches_whole_output() {
    let task = task_with_outputs(json!({
      "o": { "type": "json", "json_path": "$" }
    }));
    let raw = json!("hi");

    let outputs = extract_outputs(&task, &raw).unwrap();
    assert_eq!(outputs["o"], json!("hi"));
  }

  #[test]
  fn test_file_spec_is_verbatim() {
    let task = task_with_outputs(json!({
      "dump": { "type": "file", "path": "data/out.json" }
    }));
    let raw = json!({ "ignored": true });

    let outputs = extract_outputs(&task, &raw).unwrap();
    assert_eq!(outputs["dump"], json!("data/out.json"));
  }

  #[test]
  fn test_unknown_spec_passes_raw_through() {
    let task = task_with_outputs(json!({
      "everything": { "type": "stdout" }
    }));
    let raw = json!({ "a": 1 });

    let outputs = extract_outputs(&task, &raw).unwrap();
    assert_eq!(outputs["everything"], raw);
  }

  #[test]
  fn test_invalid_json_path_is_an_error() {
    let task = task_with_outputs(json!({
      "bad": { "type": "json", "json_path": "not a path" }
    }));
    let raw = json!({});

    assert!(matches!(
      extract_outputs(&task, &raw),
      Err(TaskFailure::JsonPath { .. })
    ));
  }
}
