//! Content-addressed task fingerprints.

use serde_json::Value;
use sha2::{Digest, Sha256};
use skein_blueprint::TaskDef;

/// Canonical JSON: compact separators with lexicographically ordered keys.
///
/// `serde_json` objects are backed by `BTreeMap`, so keys come out sorted;
/// rendering a round-tripped value therefore yields the canonical form.
pub fn canonical_json(value: &Value) -> String {
  value.to_string()
}

/// SHA-256 hex digest of the task descriptor's canonical JSON.
///
/// Fingerprints taken after template resolution incorporate substituted
/// upstream values, so a change in a parent's output invalidates the cached
/// result of every descendant even when the descendant's own template text
/// is unchanged.
pub fn fingerprint(task: &TaskDef) -> String {
  let value = serde_json::to_value(task).unwrap_or(Value::Null);
  let mut hasher = Sha256::new();
  hasher.update(canonical_json(&value).as_bytes());
  hex::encode(hasher.finalize())
}
