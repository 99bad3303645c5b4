//! Placeholder substitution against upstream task outputs.
//!
//! The substitution context is a flat map built by iterating a task's
//! `depends_on` in declaration order and merging each parent's outputs into
//! it. On a name collision a later parent silently overwrites an earlier
//! one; the blueprint author controls parent order.
//!
//! Placeholders are the exact form `{{name}}` with no whitespace tolerance.
//! Substitution happens in `command`, `url`, each header value, and inside
//! `body` by round-tripping it through its serialized form, so placeholders
//! nested in structured strings are substituted too. Placeholders with no
//! producing parent stay in place.

use std::collections::HashMap;

use serde_json::Value;
use skein_blueprint::{TaskDef, TaskKind};
use skein_store::TaskOutputs;

/// Build the flat substitution context for `task`.
fn build_context(task: &TaskDef, results: &HashMap<String, TaskOutputs>) -> HashMap<String, Value> {
  let mut context = HashMap::new();
  for parent in &task.depends_on {
    if let Some(outputs) = results.get(parent) {
      for (name, value) in outputs {
        context.insert(name.clone(), value.clone());
      }
    }
  }
  context
}

/// Placeholder values substitute as their string contents; everything else
/// substitutes as its JSON rendering.
fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn substitute(text: &str, context: &HashMap<String, Value>) -> String {
  let mut resolved = text.to_string();
  for (name, value) in context {
    let placeholder = format!("{{{{{name}}}}}");
    if resolved.contains(&placeholder) {
      resolved = resolved.replace(&placeholder, &stringify(value));
    }
  }
  resolved
}

/// Produce the resolved copy of `task` with placeholders substituted from
/// its parents' outputs.
///
/// Fails only when a substituted `body` no longer parses as JSON.
pub fn resolve_task(
  task: &TaskDef,
  results: &HashMap<String, TaskOutputs>,
) -> Result<TaskDef, serde_json::Error> {
  let context = build_context(task, results);
  let mut resolved = task.clone();

  match &mut resolved.kind {
    TaskKind::Shell { command } => {
      *command = substitute(command, &context);
    }
    TaskKind::RestApi {
      url, headers, body, ..
    } => {
      *url = substitute(url, &context);
      for value in headers.values_mut() {
        *value = substitute(value, &context);
      }
      if let Some(body) = body {
        let text = substitute(&body.to_string(), &context);
        *body = serde_json::from_str(&text)?;
      }
    }
    TaskKind::Email { .. } => {}
  }

  Ok(resolved)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn shell(id: &str, command: &str, deps: &[&str]) -> TaskDef {
    serde_json::from_value(json!({
      "id": id,
      "type": "SHELL",
      "command": command,
      "depends_on": deps,
    }))
    .unwrap()
  }

  fn outputs(pairs: &[(&str, Value)]) -> TaskOutputs {
    pairs
      .iter()
      .map(|(name, value)| (name.to_string(), value.clone()))
      .collect()
  }

  #[test]
  fn test_substitutes_command() {
    let task = shell("b", "echo {{greeting}}", &["a"]);
    let results = HashMap::from([("a".to_string(), outputs(&[("greeting", json!("hi"))]))]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::Shell { command } => assert_eq!(command, "echo hi"),
      _ => panic!("expected SHELL task"),
    }
  }

  #[test]
  fn test_non_string_values_substitute_as_json() {
    let task = shell("b", "retry {{count}} {{flag}}", &["a"]);
    let results = HashMap::from([(
      "a".to_string(),
      outputs(&[("count", json!(5)), ("flag", json!(true))]),
    )]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::Shell { command } => assert_eq!(command, "retry 5 true"),
      _ => panic!("expected SHELL task"),
    }
  }

  #[test]
  fn test_unknown_placeholder_stays_in_place() {
    let task = shell("b", "echo {{missing}}", &["a"]);
    let results = HashMap::from([("a".to_string(), outputs(&[("other", json!("x"))]))]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::Shell { command } => assert_eq!(command, "echo {{missing}}"),
      _ => panic!("expected SHELL task"),
    }
  }

  #[test]
  fn test_whitespace_in_placeholder_is_not_tolerated() {
    let task = shell("b", "echo {{ name }}", &["a"]);
    let results = HashMap::from([("a".to_string(), outputs(&[("name", json!("x"))]))]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::Shell { command } => assert_eq!(command, "echo {{ name }}"),
      _ => panic!("expected SHELL task"),
    }
  }

  #[test]
  fn test_later_parent_wins_on_collision() {
    let task = shell("c", "echo {{value}}", &["a", "b"]);
    let results = HashMap::from([
      ("a".to_string(), outputs(&[("value", json!("first"))])),
      ("b".to_string(), outputs(&[("value", json!("second"))])),
    ]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::Shell { command } => assert_eq!(command, "echo second"),
      _ => panic!("expected SHELL task"),
    }
  }

  #[test]
  fn test_rest_task_url_headers_and_body() {
    let task: TaskDef = serde_json::from_value(json!({
      "id": "post",
      "type": "RESTAPI",
      "method": "POST",
      "url": "https://api.example.com/items/{{item_id}}",
      "headers": { "authorization": "Bearer {{token}}" },
      "body": { "note": "created from {{item_id}}", "nested": { "id": "{{item_id}}" } },
      "depends_on": ["lookup"]
    }))
    .unwrap();
    let results = HashMap::from([(
      "lookup".to_string(),
      outputs(&[("item_id", json!("42")), ("token", json!("secret"))]),
    )]);

    let resolved = resolve_task(&task, &results).unwrap();
    match resolved.kind {
      TaskKind::RestApi {
        url, headers, body, ..
      } => {
        assert_eq!(url, "https://api.example.com/items/42");
        assert_eq!(headers["authorization"], "Bearer secret");
        assert_eq!(
          body.unwrap(),
          json!({ "note": "created from 42", "nested": { "id": "42" } })
        );
      }
      _ => panic!("expected RESTAPI task"),
    }
  }

  #[test]
  fn test_body_breaking_substitution_is_an_error() {
    let task: TaskDef = serde_json::from_value(json!({
      "id": "post",
      "type": "RESTAPI",
      "method": "POST",
      "url": "https://api.example.com",
      "body": { "note": "{{payload}}" },
      "depends_on": ["a"]
    }))
    .unwrap();
    // the quote in the value breaks the serialized body
    let results = HashMap::from([("a".to_string(), outputs(&[("payload", json!("x\" y"))]))]);

    assert!(resolve_task(&task, &results).is_err());
  }

  #[test]
  fn test_email_fields_are_not_substituted() {
    let task: TaskDef = serde_json::from_value(json!({
      "id": "notify",
      "type": "EMAIL",
      "subject": "{{subject}}",
      "emailBody": "{{body}}",
      "recipients": ["ops@example.com"],
      "depends_on": ["a"]
    }))
    .unwrap();
    let results = HashMap::from([(
      "a".to_string(),
      outputs(&[("subject", json!("s")), ("body", json!("b"))]),
    )]);

    let resolved = resolve_task(&task, &results).unwrap();
    assert_eq!(resolved, task);
  }
}
