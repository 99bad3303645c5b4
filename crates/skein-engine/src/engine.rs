//! The execution controller: run-state machine, serial and parallel drivers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use skein_blueprint::{BlueprintDef, TaskDef, TaskGraph};
use skein_exec::TaskExecutor;
use skein_store::{
  CacheEntry, StoreError, TaskOutputs, TaskStatus, WorkflowStatus, WorkflowStore,
};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::error::{EngineError, TaskFailure};
use crate::extract::extract_outputs;
use crate::fingerprint::fingerprint;
use crate::plan::reexecution_set;
use crate::template::resolve_task;

/// Result of a single task attempt.
///
/// Failures are data, not errors: the drivers branch on them to block
/// descendants and keep independent branches running.
enum TaskOutcome {
  Completed(TaskOutputs),
  Failed(TaskFailure),
}

/// Drives one workflow.
///
/// The engine owns the validated graph and the run directory, and is the
/// only writer of its workflow's task statuses and result map. It is shared
/// behind an [`Arc`] so a control session can pause, resume, and restart a
/// run in flight.
pub struct WorkflowEngine {
  wf_key: String,
  base_dir: PathBuf,
  nodes: HashMap<String, TaskDef>,
  graph: TaskGraph,
  order: Vec<String>,
  /// Run-scoped results; mutated only by the driver loop.
  results: Mutex<HashMap<String, TaskOutputs>>,
  /// Mirrors the stored workflow status so the pause gate can wait on a
  /// change instead of polling the store.
  status_tx: watch::Sender<WorkflowStatus>,
  store: Arc<dyn WorkflowStore>,
  executor: TaskExecutor,
}

impl std::fmt::Debug for WorkflowEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkflowEngine")
      .field("wf_key", &self.wf_key)
      .field("base_dir", &self.base_dir)
      .field("order", &self.order)
      .field("executor", &self.executor)
      .finish_non_exhaustive()
  }
}

impl WorkflowEngine {
  /// Validate the blueprint, build the graph, create the run directory, and
  /// initialize run state (workflow and every task PENDING).
  ///
  /// Cycle rejection happens before any store key is written, so an invalid
  /// blueprint leaves no trace in the store.
  pub async fn new(
    def: BlueprintDef,
    store: Arc<dyn WorkflowStore>,
    runs_root: impl AsRef<Path>,
  ) -> Result<Self, EngineError> {
    let graph = TaskGraph::build(&def.tasks)?;
    let order = graph.topological_sort()?;

    let wf_key = def.wf_key();
    let base_dir = runs_root
      .as_ref()
      .join(format!("{}_{}", def.workflow_name, def.version));
    tokio::fs::create_dir_all(&base_dir)
      .await
      .map_err(|source| EngineError::RunDir {
        path: base_dir.clone(),
        source,
      })?;

    let nodes: HashMap<String, TaskDef> = def
      .tasks
      .into_iter()
      .map(|task| (task.id.clone(), task))
      .collect();

    store.init_workflow(&wf_key, &order).await?;
    let (status_tx, _) = watch::channel(WorkflowStatus::Pending);

    info!(workflow = %wf_key, tasks = order.len(), "workflow_started");

    Ok(Self {
      wf_key,
      base_dir,
      nodes,
      graph,
      order,
      results: Mutex::new(HashMap::new()),
      status_tx,
      store,
      executor: TaskExecutor::new(),
    })
  }

  /// Workflow identity key (`<name>:<version>`).
  pub fn wf_key(&self) -> &str {
    &self.wf_key
  }

  /// Working directory for SHELL tasks and RESTAPI response dumps.
  pub fn base_dir(&self) -> &Path {
    &self.base_dir
  }

  /// Current workflow status as tracked by this engine.
  pub fn status(&self) -> WorkflowStatus {
    *self.status_tx.borrow()
  }

  /// Snapshot of the current run's result map.
  pub fn results(&self) -> HashMap<String, TaskOutputs> {
    self.results.lock().unwrap().clone()
  }

  /// Final workflow outputs: the result-map entry of every leaf task, null
  /// for leaves that did not complete this run.
  pub fn leaf_outputs(&self) -> HashMap<String, serde_json::Value> {
    let results = self.results.lock().unwrap();
    self
      .graph
      .leaves()
      .into_iter()
      .map(|leaf| {
        let value = results
          .get(&leaf)
          .and_then(|outputs| serde_json::to_value(outputs).ok())
          .unwrap_or(serde_json::Value::Null);
        (leaf, value)
      })
      .collect()
  }

  /// Worker-pool bound: the graph's widest frontier, capped at five workers
  /// per logical CPU.
  pub fn estimate_max_workers(&self) -> usize {
    self.graph.max_width().min(num_cpus::get() * 5).max(1)
  }

  /// Pause scheduling. Tasks already running finish undisturbed; no new
  /// task starts while paused.
  pub async fn pause(&self) -> Result<(), StoreError> {
    self.set_workflow_status(WorkflowStatus::Paused).await
  }

  /// Resume a paused workflow. A no-op in any other state.
  pub async fn resume(&self) -> Result<(), StoreError> {
    if self.status() == WorkflowStatus::Paused {
      self.set_workflow_status(WorkflowStatus::Running).await?;
    }
    Ok(())
  }

  /// Reset run state so a subsequent run re-executes.
  ///
  /// With `from_task` given, only that task and its transitive descendants
  /// go back to PENDING; otherwise the whole status map is reinitialized.
  /// The cache is untouched either way; the next run replans against it.
  pub async fn restart(&self, from_task: Option<&str>) -> Result<(), StoreError> {
    match from_task {
      None => {
        self.store.init_workflow(&self.wf_key, &self.order).await?;
      }
      Some(task_id) => {
        self
          .store
          .set_task_status(&self.wf_key, task_id, TaskStatus::Pending)
          .await?;
        for descendant in self.graph.descendants(task_id) {
          self
            .store
            .set_task_status(&self.wf_key, &descendant, TaskStatus::Pending)
            .await?;
        }
        self
          .store
          .set_workflow_status(&self.wf_key, WorkflowStatus::Pending)
          .await?;
      }
    }
    self.status_tx.send_replace(WorkflowStatus::Pending);
    info!(workflow = %self.wf_key, from_task, "workflow restarted");
    Ok(())
  }

  /// Serial driver: execute tasks one at a time in topological order.
  ///
  /// A failed task marks its transitive descendants blocked; blocked tasks
  /// are reported PENDING and skipped while independent tasks keep running.
  #[instrument(name = "workflow_run", skip(self), fields(workflow = %self.wf_key))]
  pub async fn run(&self) -> Result<HashMap<String, TaskOutputs>, EngineError> {
    let reexec = self.plan().await?;
    self.set_workflow_status(WorkflowStatus::Running).await?;
    self.results.lock().unwrap().clear();

    let mut blocked: HashSet<String> = HashSet::new();
    let mut any_failed = false;

    for task_id in &self.order {
      if blocked.contains(task_id) {
        self.mark_blocked(task_id).await?;
        continue;
      }
      match self.run_single_task(task_id, &reexec).await? {
        TaskOutcome::Completed(outputs) => {
          self.results.lock().unwrap().insert(task_id.clone(), outputs);
        }
        TaskOutcome::Failed(_) => {
          any_failed = true;
          blocked.extend(self.graph.descendants(task_id));
        }
      }
    }

    self.finalize(any_failed).await?;
    Ok(self.results())
  }

  /// Parallel driver: run independent tasks concurrently on a pool bounded
  /// by `workers`.
  ///
  /// Completions are drained here, on the dispatch task; it alone mutates
  /// the result map, the live indegree copy, and the blocked set. Workers
  /// only execute and hand their outcome back.
  #[instrument(name = "workflow_run_parallel", skip(self), fields(workflow = %self.wf_key, workers))]
  pub async fn run_parallel(
    self: Arc<Self>,
    workers: usize,
  ) -> Result<HashMap<String, TaskOutputs>, EngineError> {
    let reexec = Arc::new(self.plan().await?);
    self.set_workflow_status(WorkflowStatus::Running).await?;
    self.results.lock().unwrap().clear();

    let mut indegree = self.graph.indegree().clone();
    let mut blocked: HashSet<String> = HashSet::new();
    let mut any_failed = false;

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut in_flight: JoinSet<(String, Result<TaskOutcome, StoreError>)> = JoinSet::new();

    let ready: Vec<String> = indegree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(id, _)| id.clone())
      .collect();
    for task_id in ready {
      spawn_worker(&self, &mut in_flight, &semaphore, &reexec, task_id);
    }

    while let Some(joined) = in_flight.join_next().await {
      let (task_id, outcome) = joined?;
      match outcome? {
        TaskOutcome::Completed(outputs) => {
          self.results.lock().unwrap().insert(task_id.clone(), outputs);
        }
        TaskOutcome::Failed(_) => {
          any_failed = true;
          blocked.extend(self.graph.descendants(&task_id));
        }
      }

      // Decrement children of the finished task. Blocked tasks are not
      // executed but still cascade, so every descendant of a failure gets
      // its indegree drained and is explicitly reported PENDING.
      let mut settled = VecDeque::from([task_id]);
      while let Some(parent) = settled.pop_front() {
        for child in self.graph.children(&parent) {
          let Some(degree) = indegree.get_mut(child) else {
            continue;
          };
          *degree -= 1;
          if *degree > 0 {
            continue;
          }
          if blocked.contains(child) {
            self.mark_blocked(child).await?;
            settled.push_back(child.clone());
          } else {
            spawn_worker(&self, &mut in_flight, &semaphore, &reexec, child.clone());
          }
        }
      }
    }

    self.finalize(any_failed).await?;
    Ok(self.results())
  }

  /// Run one task to completion, consulting the cache first.
  async fn run_single_task(
    &self,
    task_id: &str,
    reexec: &HashSet<String>,
  ) -> Result<TaskOutcome, StoreError> {
    self.pause_gate().await;
    self.set_task_status(task_id, TaskStatus::Running).await?;

    let raw = &self.nodes[task_id];
    let snapshot = self.results.lock().unwrap().clone();

    let resolved = match resolve_task(raw, &snapshot) {
      Ok(task) => task,
      Err(source) => {
        return self
          .fail_task(
            task_id,
            TaskFailure::ResolvedBody {
              task_id: task_id.to_string(),
              source,
            },
          )
          .await;
      }
    };

    let config_hash = fingerprint(&resolved);
    let cached = self.store.load_cache(&self.wf_key, task_id).await?;

    if !reexec.contains(task_id) {
      if let Some(entry) = &cached {
        if entry.config_hash == config_hash {
          debug!(workflow = %self.wf_key, task = task_id, "serving cached result");
          self.set_task_status(task_id, TaskStatus::Completed).await?;
          return Ok(TaskOutcome::Completed(entry.outputs.clone()));
        }
      }
    }

    let raw_output = match self.executor.execute(&resolved, &self.base_dir).await {
      Ok(output) => output,
      Err(err) => return self.fail_task(task_id, err.into()).await,
    };

    let outputs = match extract_outputs(&resolved, &raw_output) {
      Ok(outputs) => outputs,
      Err(failure) => return self.fail_task(task_id, failure).await,
    };

    // cache write precedes the COMPLETED publication, so a subscriber
    // reacting to COMPLETED can already read the cached outputs
    self
      .store
      .store_cache(
        &self.wf_key,
        task_id,
        &CacheEntry {
          outputs: outputs.clone(),
          config_hash,
        },
      )
      .await?;
    self.set_task_status(task_id, TaskStatus::Completed).await?;
    info!(workflow = %self.wf_key, task = task_id, "task_completed");

    Ok(TaskOutcome::Completed(outputs))
  }

  async fn fail_task(
    &self,
    task_id: &str,
    failure: TaskFailure,
  ) -> Result<TaskOutcome, StoreError> {
    error!(workflow = %self.wf_key, task = task_id, error = %failure, "task_failed");
    self.set_task_status(task_id, TaskStatus::Failed).await?;
    Ok(TaskOutcome::Failed(failure))
  }

  async fn mark_blocked(&self, task_id: &str) -> Result<(), StoreError> {
    info!(workflow = %self.wf_key, task = task_id, "task blocked (ancestor failed)");
    self.set_task_status(task_id, TaskStatus::Pending).await
  }

  /// Block while the workflow is paused.
  ///
  /// Woken by the status watch on every workflow-status write; no task is
  /// interrupted mid-execution, pause only gates scheduling.
  async fn pause_gate(&self) {
    let mut rx = self.status_tx.subscribe();
    // the sender lives on self, so wait_for cannot fail
    let _ = rx
      .wait_for(|status| *status != WorkflowStatus::Paused)
      .await;
  }

  async fn plan(&self) -> Result<HashSet<String>, StoreError> {
    let reexec = reexecution_set(
      self.store.as_ref(),
      &self.wf_key,
      &self.graph,
      &self.nodes,
      &self.order,
    )
    .await?;
    debug!(workflow = %self.wf_key, replanned = reexec.len(), "computed re-execution set");
    Ok(reexec)
  }

  async fn finalize(&self, any_failed: bool) -> Result<(), StoreError> {
    let status = if any_failed {
      WorkflowStatus::Failed
    } else {
      WorkflowStatus::Completed
    };
    info!(workflow = %self.wf_key, status = %status, "workflow finished");
    self.set_workflow_status(status).await
  }

  async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
    self
      .store
      .set_task_status(&self.wf_key, task_id, status)
      .await
  }

  async fn set_workflow_status(&self, status: WorkflowStatus) -> Result<(), StoreError> {
    self.store.set_workflow_status(&self.wf_key, status).await?;
    self.status_tx.send_replace(status);
    Ok(())
  }
}

/// Hand one ready task to the pool.
///
/// The worker only executes; the dispatch loop in `run_parallel` applies
/// the outcome to scheduling state.
fn spawn_worker(
  engine: &Arc<WorkflowEngine>,
  in_flight: &mut JoinSet<(String, Result<TaskOutcome, StoreError>)>,
  semaphore: &Arc<Semaphore>,
  reexec: &Arc<HashSet<String>>,
  task_id: String,
) {
  let engine = Arc::clone(engine);
  let semaphore = Arc::clone(semaphore);
  let reexec = Arc::clone(reexec);
  in_flight.spawn(async move {
    // the semaphore is never closed, so acquire cannot fail
    let _permit = semaphore.acquire_owned().await;
    let outcome = engine.run_single_task(&task_id, &reexec).await;
    (task_id, outcome)
  });
}
