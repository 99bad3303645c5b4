//! REST task execution.

use std::collections::HashMap;
use std::path::Path;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use skein_blueprint::ExtractionSpec;
use tracing::debug;

use crate::error::ExecFailure;

/// Issue the HTTP request described by the task.
///
/// The method is upper-cased, headers are sent verbatim, and `body` is sent
/// as JSON when present. A non-2xx status is a failure. For every `json`
/// output spec the raw response body is additionally written to
/// `base_dir/<json_path>` (creating parent directories) so downstream tasks
/// can pick the dump up from disk.
///
/// Returns the parsed response body when it is valid JSON, the raw text
/// otherwise.
pub(crate) async fn run(
  client: &Client,
  method: &str,
  url: &str,
  headers: &HashMap<String, String>,
  body: Option<&serde_json::Value>,
  outputs: &HashMap<String, ExtractionSpec>,
  base_dir: &Path,
) -> Result<serde_json::Value, ExecFailure> {
  let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|_| ExecFailure::Method(method.to_string()))?;

  let mut header_map = HeaderMap::new();
  for (name, value) in headers {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ExecFailure::Header {
      name: name.clone(),
      message: e.to_string(),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ExecFailure::Header {
      name: name.clone(),
      message: e.to_string(),
    })?;
    header_map.insert(header_name, header_value);
  }

  debug!(method = %method, url, "running rest task");

  let mut request = client.request(method, url).headers(header_map);
  if let Some(body) = body {
    request = request.json(body);
  }

  let response = request.send().await?;
  let status = response.status();
  let text = response.text().await?;

  if !status.is_success() {
    return Err(ExecFailure::HttpStatus { status, body: text });
  }

  for spec in outputs.values() {
    if let ExtractionSpec::Json { json_path } = spec {
      let path = base_dir.join(json_path);
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
          .await
          .map_err(|source| ExecFailure::Dump {
            path: path.clone(),
            source,
          })?;
      }
      tokio::fs::write(&path, &text)
        .await
        .map_err(|source| ExecFailure::Dump {
          path: path.clone(),
          source,
        })?;
      debug!(path = %path.display(), "wrote response dump");
    }
  }

  Ok(match serde_json::from_str(&text) {
    Ok(value) => value,
    Err(_) => serde_json::Value::String(text),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_method_is_rejected() {
    let method = reqwest::Method::from_bytes("NOT A METHOD".as_bytes());
    assert!(method.is_err());
  }

  #[test]
  fn test_method_is_upper_cased() {
    let method = reqwest::Method::from_bytes("post".to_uppercase().as_bytes()).unwrap();
    assert_eq!(method, reqwest::Method::POST);
  }
}
