//! Run-state store, event bus, and result cache.
//!
//! One backing key-value service carries three concerns:
//! - the status store: per-task statuses and a scalar workflow status,
//! - the event bus: a pub/sub channel per workflow carrying status
//!   transitions as JSON envelopes,
//! - the result cache: per-task outputs keyed by configuration hash,
//!   surviving across runs.
//!
//! The [`WorkflowStore`] trait keeps the backing service pluggable:
//! [`RedisStore`] is the production implementation, [`MemoryStore`] backs
//! tests and single-process batch runs.
//!
//! Every status mutation publishes its envelope on the workflow's channel;
//! publications for one workflow reach a subscriber in publish order.

mod error;
mod memory;
mod redis;
mod types;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{CacheEntry, Event, TaskOutputs, TaskStatus, WorkflowStatus};

pub use crate::redis::RedisStore;

/// Ordered stream of events for a single workflow.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Shared persistence surface for workflow runs.
///
/// Key scheme (mirrored by every implementation):
/// - `wf:<wf_key>:tasks`: field-map of task id -> status
/// - `wf:<wf_key>:status`: workflow status scalar
/// - `wf:<wf_key>:events`: pub/sub channel of [`Event`] envelopes
/// - `<wf_key>:cache:<task_id>`: JSON-encoded [`CacheEntry`]
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  /// Reset every task and the workflow itself to PENDING, publishing the
  /// corresponding events.
  async fn init_workflow(&self, wf_key: &str, task_ids: &[String]) -> Result<(), StoreError>;

  /// Record a task status and publish a `task_update` envelope.
  async fn set_task_status(
    &self,
    wf_key: &str,
    task_id: &str,
    status: TaskStatus,
  ) -> Result<(), StoreError>;

  /// All recorded task statuses for a workflow.
  async fn task_statuses(
    &self,
    wf_key: &str,
  ) -> Result<HashMap<String, TaskStatus>, StoreError>;

  /// Record the workflow status and publish a `workflow_update` envelope.
  async fn set_workflow_status(
    &self,
    wf_key: &str,
    status: WorkflowStatus,
  ) -> Result<(), StoreError>;

  /// The recorded workflow status, or `None` when no run was ever
  /// initialized under this key.
  async fn workflow_status(&self, wf_key: &str) -> Result<Option<WorkflowStatus>, StoreError>;

  /// Publish an event on the workflow's channel.
  async fn publish(&self, wf_key: &str, event: &Event) -> Result<(), StoreError>;

  /// Subscribe to the workflow's event channel.
  async fn subscribe(&self, wf_key: &str) -> Result<EventStream, StoreError>;

  /// Load the cached result for `(wf_key, task_id)`.
  async fn load_cache(
    &self,
    wf_key: &str,
    task_id: &str,
  ) -> Result<Option<CacheEntry>, StoreError>;

  /// Persist the cached result for `(wf_key, task_id)`.
  async fn store_cache(
    &self,
    wf_key: &str,
    task_id: &str,
    entry: &CacheEntry,
  ) -> Result<(), StoreError>;
}

pub(crate) mod keys {
  pub fn tasks(wf_key: &str) -> String {
    format!("wf:{wf_key}:tasks")
  }

  pub fn status(wf_key: &str) -> String {
    format!("wf:{wf_key}:status")
  }

  pub fn events(wf_key: &str) -> String {
    format!("wf:{wf_key}:events")
  }

  pub fn cache(wf_key: &str, task_id: &str) -> String {
    format!("{wf_key}:cache:{task_id}")
  }
}
