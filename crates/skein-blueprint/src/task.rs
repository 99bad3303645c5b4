use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single task descriptor within a blueprint.
///
/// Descriptors are immutable inputs: the engine clones and resolves them,
/// it never mutates the blueprint's own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  /// Unique id within the workflow.
  pub id: String,
  /// Parent task ids, in declaration order.
  #[serde(default)]
  pub depends_on: Vec<String>,
  /// Named outputs projected from the raw executor output.
  #[serde(default)]
  pub outputs: HashMap<String, ExtractionSpec>,
  #[serde(flatten)]
  pub kind: TaskKind,
}

impl TaskDef {
  /// The wire name of this task's type.
  pub fn type_name(&self) -> &'static str {
    match self.kind {
      TaskKind::Shell { .. } => "SHELL",
      TaskKind::RestApi { .. } => "RESTAPI",
      TaskKind::Email { .. } => "EMAIL",
    }
  }
}

/// Type-specific task payload, tagged by the blueprint's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskKind {
  #[serde(rename = "SHELL")]
  Shell { command: String },

  #[serde(rename = "RESTAPI")]
  RestApi {
    method: String,
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
  },

  #[serde(rename = "EMAIL")]
  Email {
    subject: String,
    #[serde(rename = "emailBody")]
    email_body: String,
    recipients: Vec<String>,
  },
}

/// How a named output is projected from the raw executor output.
///
/// Unrecognized `type` tags fall back to [`ExtractionSpec::Raw`], which
/// passes the raw output through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExtractionSpec {
  /// First JSONPath match against the raw output, or null when none.
  Json { json_path: String },
  /// The path string itself, verbatim; the engine does not read the file.
  File { path: String },
  #[serde(other)]
  Raw,
}
