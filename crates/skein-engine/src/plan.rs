//! Re-execution planning.
//!
//! Before a run, every task's descriptor is fingerprinted and compared
//! against the hash stored with its cached result. A difference (or a
//! missing entry) marks the task for re-execution, together with all of its
//! transitive descendants: a config edit anywhere invalidates everything
//! downstream of it.
//!
//! Stored hashes cover the *resolved* descriptor, so the comparison has to
//! resolve too: each task is resolved against its parents' cached outputs,
//! walking the topological order. An unchanged blueprint whose upstream
//! outputs are all cached therefore replans to the empty set, while any
//! template-text or config edit shows up as a mismatch.
//!
//! The second resolved-descriptor check at execution time (see the engine)
//! catches the remaining case: live upstream outputs that differ from the
//! cached ones that produced the entry.

use std::collections::{HashMap, HashSet};

use skein_blueprint::{TaskDef, TaskGraph};
use skein_store::{StoreError, TaskOutputs, WorkflowStore};

use crate::fingerprint::fingerprint;
use crate::template::resolve_task;

/// Compute the set of tasks that must re-execute this run.
pub(crate) async fn reexecution_set(
  store: &dyn WorkflowStore,
  wf_key: &str,
  graph: &TaskGraph,
  nodes: &HashMap<String, TaskDef>,
  order: &[String],
) -> Result<HashSet<String>, StoreError> {
  let mut reexec = HashSet::new();
  let mut cached_outputs: HashMap<String, TaskOutputs> = HashMap::new();

  for task_id in order {
    let task = &nodes[task_id];
    match store.load_cache(wf_key, task_id).await? {
      None => {
        reexec.insert(task_id.clone());
      }
      Some(entry) => {
        // a parent missing from the cache leaves placeholders in place,
        // which fails the comparison below just like an edit would
        let changed = match resolve_task(task, &cached_outputs) {
          Ok(resolved) => fingerprint(&resolved) != entry.config_hash,
          Err(_) => true,
        };
        if changed {
          reexec.insert(task_id.clone());
        }
        cached_outputs.insert(task_id.clone(), entry.outputs);
      }
    }
  }

  for task_id in reexec.clone() {
    reexec.extend(graph.descendants(&task_id));
  }

  Ok(reexec)
}
