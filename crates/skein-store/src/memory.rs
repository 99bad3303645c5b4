//! In-memory store for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::{CacheEntry, Event, EventStream, TaskStatus, WorkflowStatus, WorkflowStore};

const CHANNEL_CAPACITY: usize = 256;

/// In-memory implementation of [`WorkflowStore`].
///
/// State does not survive the process; the pub/sub channel is a
/// [`broadcast`] channel per workflow. Slow subscribers that fall more than
/// the channel capacity behind skip the lagged span.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
  task_statuses: HashMap<String, HashMap<String, TaskStatus>>,
  workflow_statuses: HashMap<String, WorkflowStatus>,
  cache: HashMap<(String, String), CacheEntry>,
  channels: HashMap<String, broadcast::Sender<Event>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn sender(&self, wf_key: &str) -> broadcast::Sender<Event> {
    let mut inner = self.inner.lock().unwrap();
    inner
      .channels
      .entry(wf_key.to_string())
      .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
      .clone()
  }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
  async fn init_workflow(&self, wf_key: &str, task_ids: &[String]) -> Result<(), StoreError> {
    {
      let mut inner = self.inner.lock().unwrap();
      inner.task_statuses.insert(
        wf_key.to_string(),
        task_ids
          .iter()
          .map(|tid| (tid.clone(), TaskStatus::Pending))
          .collect(),
      );
      inner
        .workflow_statuses
        .insert(wf_key.to_string(), WorkflowStatus::Pending);
    }

    self
      .publish(
        wf_key,
        &Event::WorkflowUpdate {
          status: WorkflowStatus::Pending,
        },
      )
      .await?;
    for task_id in task_ids {
      self
        .publish(
          wf_key,
          &Event::TaskUpdate {
            task_id: task_id.clone(),
            status: TaskStatus::Pending,
          },
        )
        .await?;
    }

    Ok(())
  }

  async fn set_task_status(
    &self,
    wf_key: &str,
    task_id: &str,
    status: TaskStatus,
  ) -> Result<(), StoreError> {
    self
      .inner
      .lock()
      .unwrap()
      .task_statuses
      .entry(wf_key.to_string())
      .or_default()
      .insert(task_id.to_string(), status);

    self
      .publish(
        wf_key,
        &Event::TaskUpdate {
          task_id: task_id.to_string(),
          status,
        },
      )
      .await
  }

  async fn task_statuses(
    &self,
    wf_key: &str,
  ) -> Result<HashMap<String, TaskStatus>, StoreError> {
    Ok(
      self
        .inner
        .lock()
        .unwrap()
        .task_statuses
        .get(wf_key)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn set_workflow_status(
    &self,
    wf_key: &str,
    status: WorkflowStatus,
  ) -> Result<(), StoreError> {
    self
      .inner
      .lock()
      .unwrap()
      .workflow_statuses
      .insert(wf_key.to_string(), status);

    self
      .publish(wf_key, &Event::WorkflowUpdate { status })
      .await
  }

  async fn workflow_status(&self, wf_key: &str) -> Result<Option<WorkflowStatus>, StoreError> {
    Ok(
      self
        .inner
        .lock()
        .unwrap()
        .workflow_statuses
        .get(wf_key)
        .copied(),
    )
  }

  async fn publish(&self, wf_key: &str, event: &Event) -> Result<(), StoreError> {
    // send fails only when no subscriber is listening
    let _ = self.sender(wf_key).send(event.clone());
    Ok(())
  }

  async fn subscribe(&self, wf_key: &str) -> Result<EventStream, StoreError> {
    let receiver = self.sender(wf_key).subscribe();

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
      loop {
        match receiver.recv().await {
          Ok(event) => return Some((event, receiver)),
          Err(broadcast::error::RecvError::Lagged(_)) => continue,
          Err(broadcast::error::RecvError::Closed) => return None,
        }
      }
    });
    Ok(Box::pin(stream))
  }

  async fn load_cache(
    &self,
    wf_key: &str,
    task_id: &str,
  ) -> Result<Option<CacheEntry>, StoreError> {
    Ok(
      self
        .inner
        .lock()
        .unwrap()
        .cache
        .get(&(wf_key.to_string(), task_id.to_string()))
        .cloned(),
    )
  }

  async fn store_cache(
    &self,
    wf_key: &str,
    task_id: &str,
    entry: &CacheEntry,
  ) -> Result<(), StoreError> {
    self
      .inner
      .lock()
      .unwrap()
      .cache
      .insert((wf_key.to_string(), task_id.to_string()), entry.clone());
    Ok(())
  }
}
