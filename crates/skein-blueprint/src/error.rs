use thiserror::Error;

/// Errors raised while loading or validating a blueprint.
#[derive(Debug, Error)]
pub enum BlueprintError {
  #[error("invalid blueprint JSON: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("blueprint is missing a 'tasks' array")]
  MissingTasks,

  #[error("duplicate task id '{0}'")]
  DuplicateTask(String),

  #[error("task '{task}' depends on unknown task '{dependency}'")]
  UnknownDependency { task: String, dependency: String },
}

/// The dependency graph contains a cycle.
///
/// Raised by the topological sort when the emitted order covers fewer tasks
/// than the graph holds.
#[derive(Debug, Error)]
#[error("cycle detected in workflow graph")]
pub struct CycleError;
