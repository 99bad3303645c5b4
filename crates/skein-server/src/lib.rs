//! WebSocket control session for workflow engines.
//!
//! One connection drives one workflow: control messages (START, PAUSE,
//! RESUME, RESTART) flow in, run events are relayed back out, and the final
//! leaf outputs are sent once the workflow completes.
//!
//! The session loop is single-threaded and cooperative: each iteration
//! races the next client message against the next bus event. Both sides
//! are persistent streams, so losing a race never drops a message.

mod session;
mod state;

use std::sync::Arc;

use tracing::info;

pub use session::router;
pub use state::ServerState;

/// Bind `addr` and serve the control API until the process exits.
pub async fn serve(state: Arc<ServerState>, addr: &str) -> std::io::Result<()> {
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!(addr, "control API listening");
  axum::serve(listener, router(state)).await
}
