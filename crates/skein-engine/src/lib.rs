//! Workflow execution engine.
//!
//! The engine takes a validated blueprint and drives it to completion:
//!
//! ```text
//! WorkflowEngine::new(def, store, runs_root)
//! ├── builds the dependency graph and rejects cycles
//! ├── creates the run directory
//! └── initializes run state (all tasks PENDING)
//!
//! run() / run_parallel(workers)
//! ├── plan: compare stored fingerprints, compute the re-execution set
//! └── per ready task: pause gate -> resolve templates -> cache check
//!     -> execute -> extract outputs -> cache write -> status publish
//! ```
//!
//! Failures are contained: a failed task blocks its transitive descendants
//! (reported PENDING) while independent branches keep running. Pause is a
//! scheduling gate; tasks already running finish undisturbed.

mod engine;
mod error;
mod extract;
mod fingerprint;
mod plan;
mod template;

pub use engine::WorkflowEngine;
pub use error::{EngineError, TaskFailure};
pub use extract::extract_outputs;
pub use fingerprint::{canonical_json, fingerprint};
pub use template::resolve_task;
