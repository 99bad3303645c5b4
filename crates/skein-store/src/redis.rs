//! Redis-backed store.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::StoreError;
use crate::keys;
use crate::{CacheEntry, Event, EventStream, TaskStatus, WorkflowStatus, WorkflowStore};

/// Store implementation backed by a Redis server.
///
/// Commands go through a shared [`ConnectionManager`]; each subscription
/// holds its own pub/sub connection so event relays are independent of
/// command traffic.
#[derive(Clone)]
pub struct RedisStore {
  client: redis::Client,
  conn: ConnectionManager,
}

impl RedisStore {
  /// Connect to the Redis server at `url`.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let client = redis::Client::open(url)?;
    let conn = client.get_connection_manager().await?;
    Ok(Self { client, conn })
  }
}

#[async_trait]
impl WorkflowStore for RedisStore {
  async fn init_workflow(&self, wf_key: &str, task_ids: &[String]) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();

    if !task_ids.is_empty() {
      let pairs: Vec<(&str, &str)> = task_ids
        .iter()
        .map(|tid| (tid.as_str(), TaskStatus::Pending.as_str()))
        .collect();
      let _: () = conn.hset_multiple(keys::tasks(wf_key), &pairs).await?;
    }
    let _: () = conn
      .set(keys::status(wf_key), WorkflowStatus::Pending.as_str())
      .await?;

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
    let mut conn = self.conn.clone();
    let _: () = conn
      .hset(keys::tasks(wf_key), task_id, status.as_str())
      .await?;
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
    let mut conn = self.conn.clone();
    let raw: HashMap<String, String> = conn.hgetall(keys::tasks(wf_key)).await?;
    raw
      .into_iter()
      .map(|(task_id, status)| Ok((task_id, status.parse()?)))
      .collect()
  }

  async fn set_workflow_status(
    &self,
    wf_key: &str,
    status: WorkflowStatus,
  ) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    let _: () = conn.set(keys::status(wf_key), status.as_str()).await?;
    self
      .publish(wf_key, &Event::WorkflowUpdate { status })
      .await
  }

  async fn workflow_status(&self, wf_key: &str) -> Result<Option<WorkflowStatus>, StoreError> {
    let mut conn = self.conn.clone();
    let raw: Option<String> = conn.get(keys::status(wf_key)).await?;
    raw.map(|s| s.parse()).transpose()
  }

  async fn publish(&self, wf_key: &str, event: &Event) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    let payload = serde_json::to_string(event)?;
    let _: () = conn.publish(keys::events(wf_key), payload).await?;
    Ok(())
  }

  async fn subscribe(&self, wf_key: &str) -> Result<EventStream, StoreError> {
    let mut pubsub = self.client.get_async_pubsub().await?;
    pubsub.subscribe(keys::events(wf_key)).await?;

    let stream = pubsub.into_on_message().filter_map(|msg| async move {
      let payload: String = msg.get_payload().ok()?;
      serde_json::from_str(&payload).ok()
    });
    Ok(Box::pin(stream))
  }

  async fn load_cache(
    &self,
    wf_key: &str,
    task_id: &str,
  ) -> Result<Option<CacheEntry>, StoreError> {
    let mut conn = self.conn.clone();
    let raw: Option<String> = conn.get(keys::cache(wf_key, task_id)).await?;
    raw
      .map(|payload| serde_json::from_str(&payload))
      .transpose()
      .map_err(StoreError::Encode)
  }

  async fn store_cache(
    &self,
    wf_key: &str,
    task_id: &str,
    entry: &CacheEntry,
  ) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    let payload = serde_json::to_string(entry)?;
    let _: () = conn.set(keys::cache(wf_key, task_id), payload).await?;
    Ok(())
  }
}
