//! The bidirectional control session.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use skein_blueprint::BlueprintDef;
use skein_engine::{EngineError, WorkflowEngine};
use skein_store::{Event, EventStream, WorkflowStatus};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::state::ServerState;

/// Control messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ControlMessage {
  #[serde(rename = "START")]
  Start {
    /// Blueprint document, either inline JSON or a JSON-encoded string.
    workflow: serde_json::Value,
  },
  #[serde(rename = "PAUSE")]
  Pause,
  #[serde(rename = "RESUME")]
  Resume,
  #[serde(rename = "RESTART")]
  Restart {
    #[serde(default)]
    from_task: Option<String>,
  },
}

impl ControlMessage {
  fn ack_type(&self) -> &'static str {
    match self {
      ControlMessage::Start { .. } => "START_ack",
      ControlMessage::Pause => "PAUSE_ack",
      ControlMessage::Resume => "RESUME_ack",
      ControlMessage::Restart { .. } => "RESTART_ack",
    }
  }
}

/// What one iteration of the session loop produced.
enum Step {
  Control(String),
  Event(Event),
  Ignored,
  Closed,
}

/// Build the router exposing the `/ws` control endpoint.
pub fn router(state: Arc<ServerState>) -> Router {
  Router::new()
    .route("/ws", get(ws_handler))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn ws_handler(
  ws: WebSocketUpgrade,
  State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
  ws.on_upgrade(move |socket| async move {
    if let Err(e) = run_session(socket, state).await {
      warn!(error = %e, "control session ended with error");
    }
  })
}

async fn run_session(mut socket: WebSocket, state: Arc<ServerState>) -> Result<(), axum::Error> {
  let mut wf_key: Option<String> = None;
  let mut events: Option<EventStream> = None;

  loop {
    let step = tokio::select! {
      message = socket.recv() => match message {
        Some(Ok(Message::Text(text))) => Step::Control(text),
        Some(Ok(Message::Close(_))) | None => Step::Closed,
        Some(Ok(_)) => Step::Ignored,
        Some(Err(e)) => return Err(e),
      },
      Some(event) = next_event(&mut events) => Step::Event(event),
    };

    match step {
      Step::Control(text) => {
        handle_control(&state, &mut socket, &mut wf_key, &mut events, &text).await?;
      }
      Step::Event(event) => {
        relay_event(&state, &mut socket, wf_key.as_deref(), &event).await?;
      }
      Step::Ignored => {}
      Step::Closed => break,
    }
  }

  if let Some(wf_key) = wf_key {
    info!(workflow = %wf_key, "control session closed");
  }
  Ok(())
}

/// Next event from the subscription, or pending forever before the first
/// START establishes one.
async fn next_event(events: &mut Option<EventStream>) -> Option<Event> {
  match events {
    Some(stream) => stream.next().await,
    None => std::future::pending().await,
  }
}

async fn handle_control(
  state: &Arc<ServerState>,
  socket: &mut WebSocket,
  wf_key: &mut Option<String>,
  events: &mut Option<EventStream>,
  text: &str,
) -> Result<(), axum::Error> {
  let message: ControlMessage = match serde_json::from_str(text) {
    Ok(message) => message,
    Err(e) => {
      return send_error(socket, &format!("invalid control message: {e}")).await;
    }
  };

  let control = match message {
    ControlMessage::Start { workflow } => {
      return match start_workflow(state, workflow).await {
        Ok((engine, stream)) => {
          *wf_key = Some(engine.wf_key().to_string());
          *events = Some(stream);
          send_json(
            socket,
            &json!({ "type": "workflow_started", "workflow_id": engine.wf_key() }),
          )
          .await
        }
        Err(e) => send_error(socket, &e.to_string()).await,
      };
    }
    other => other,
  };

  // PAUSE / RESUME / RESTART need a workflow started on this connection
  let engine = wf_key.as_deref().and_then(|key| state.engine(key));
  let Some(engine) = engine else {
    return send_error(socket, "No active workflow").await;
  };

  let outcome = match &control {
    ControlMessage::Pause => engine.pause().await,
    ControlMessage::Resume => engine.resume().await,
    ControlMessage::Restart { from_task } => match engine.restart(from_task.as_deref()).await {
      Ok(()) => {
        spawn_run(Arc::clone(&engine));
        Ok(())
      }
      Err(e) => Err(e),
    },
    // START returned above
    ControlMessage::Start { .. } => unreachable!(),
  };

  match outcome {
    Ok(()) => {
      send_json(
        socket,
        &json!({ "type": control.ack_type(), "workflow_id": engine.wf_key() }),
      )
      .await
    }
    Err(e) => send_error(socket, &e.to_string()).await,
  }
}

/// Create an engine from the submitted blueprint, subscribe to its event
/// channel, and kick off a parallel run.
async fn start_workflow(
  state: &Arc<ServerState>,
  workflow: serde_json::Value,
) -> Result<(Arc<WorkflowEngine>, EventStream), EngineError> {
  let def = match workflow {
    serde_json::Value::String(text) => BlueprintDef::from_json(&text)?,
    value => BlueprintDef::from_value(value)?,
  };

  let engine = Arc::new(WorkflowEngine::new(def, state.store(), state.runs_root()).await?);
  let stream = state.store().subscribe(engine.wf_key()).await?;
  state.register(Arc::clone(&engine));

  spawn_run(Arc::clone(&engine));
  Ok((engine, stream))
}

fn spawn_run(engine: Arc<WorkflowEngine>) {
  tokio::spawn(async move {
    let workers = engine.estimate_max_workers();
    let wf_key = engine.wf_key().to_string();
    if let Err(e) = engine.run_parallel(workers).await {
      error!(workflow = %wf_key, error = %e, "workflow run aborted");
    }
  });
}

/// Relay an event envelope to the client; on a COMPLETED workflow update,
/// follow up with the final leaf outputs.
async fn relay_event(
  state: &Arc<ServerState>,
  socket: &mut WebSocket,
  wf_key: Option<&str>,
  event: &Event,
) -> Result<(), axum::Error> {
  send_json(socket, event).await?;

  if let Event::WorkflowUpdate {
    status: WorkflowStatus::Completed,
  } = event
  {
    if let Some(engine) = wf_key.and_then(|key| state.engine(key)) {
      let outputs = engine.leaf_outputs();
      send_json(socket, &Event::WorkflowOutput { outputs }).await?;
    }
  }

  Ok(())
}

async fn send_json<T: serde::Serialize>(
  socket: &mut WebSocket,
  payload: &T,
) -> Result<(), axum::Error> {
  let text = serde_json::to_string(payload).map_err(axum::Error::new)?;
  socket.send(Message::Text(text)).await
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
  send_json(socket, &json!({ "type": "error", "message": message })).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_control_messages_parse() {
    let start: ControlMessage = serde_json::from_str(
      r#"{ "type": "START", "workflow": { "workflow_name": "demo", "tasks": [] } }"#,
    )
    .unwrap();
    assert!(matches!(start, ControlMessage::Start { .. }));

    let pause: ControlMessage = serde_json::from_str(r#"{ "type": "PAUSE" }"#).unwrap();
    assert_eq!(pause.ack_type(), "PAUSE_ack");

    let restart: ControlMessage =
      serde_json::from_str(r#"{ "type": "RESTART", "from_task": "b" }"#).unwrap();
    match restart {
      ControlMessage::Restart { from_task } => assert_eq!(from_task.as_deref(), Some("b")),
      _ => panic!("expected RESTART"),
    }
  }

  #[test]
  fn test_restart_without_from_task() {
    let restart: ControlMessage = serde_json::from_str(r#"{ "type": "RESTART" }"#).unwrap();
    assert!(matches!(
      restart,
      ControlMessage::Restart { from_task: None }
    ));
  }

  #[test]
  fn test_unknown_control_type_is_rejected() {
    let result: Result<ControlMessage, _> = serde_json::from_str(r#"{ "type": "STOP" }"#);
    assert!(result.is_err());
  }
}
