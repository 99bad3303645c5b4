use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use skein_engine::WorkflowEngine;
use skein_store::WorkflowStore;

/// Process-scoped server state: the engine registry and the shared store.
///
/// Threaded through handlers explicitly; nothing here is a global.
pub struct ServerState {
  store: Arc<dyn WorkflowStore>,
  runs_root: PathBuf,
  engines: Mutex<HashMap<String, Arc<WorkflowEngine>>>,
}

impl ServerState {
  pub fn new(store: Arc<dyn WorkflowStore>, runs_root: impl Into<PathBuf>) -> Self {
    Self {
      store,
      runs_root: runs_root.into(),
      engines: Mutex::new(HashMap::new()),
    }
  }

  pub(crate) fn store(&self) -> Arc<dyn WorkflowStore> {
    Arc::clone(&self.store)
  }

  pub(crate) fn runs_root(&self) -> &Path {
    &self.runs_root
  }

  /// Register an engine under its workflow key, replacing any previous one.
  pub(crate) fn register(&self, engine: Arc<WorkflowEngine>) {
    self
      .engines
      .lock()
      .unwrap()
      .insert(engine.wf_key().to_string(), engine);
  }

  pub(crate) fn engine(&self, wf_key: &str) -> Option<Arc<WorkflowEngine>> {
    self.engines.lock().unwrap().get(wf_key).cloned()
  }
}
