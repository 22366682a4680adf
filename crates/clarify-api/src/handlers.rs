//! Route handler functions for all API endpoints.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clarify_dialog::ClientEvent;

use crate::error::ApiError;
use crate::frames::{self, ServerFrame};
use crate::registry::SessionSummary;
use crate::state::AppState;

/// Outbound events buffered per session before the worker waits.
const OUTBOUND_BUFFER: usize = 64;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - service status.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.registry.len() as u64,
    })
}

/// GET /sessions - live conversation sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state.registry.summaries();
    Json(SessionsResponse {
        count: sessions.len() as u64,
        sessions,
    })
}

/// DELETE /sessions/{id} - end a session and cancel its worker.
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("invalid session id: {e}")))?;
    if !state.registry.remove(id) {
        return Err(ApiError::NotFound(format!("no session {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// What became of a client event handed to its worker.
#[derive(Debug, PartialEq, Eq)]
enum Forward {
    Delivered,
    /// The worker's queue is full; the event was dropped.
    Busy,
    /// The worker is gone.
    Closed,
}

const BUSY_MESSAGE: &str = "too many messages, wait for a reply";

/// Queue `event` without waiting, so the socket loop never stops draining
/// the worker's outbound frames.
fn forward(inbound: &mpsc::Sender<ClientEvent>, event: ClientEvent) -> Forward {
    match inbound.try_send(event) {
        Ok(()) => Forward::Delivered,
        Err(TrySendError::Full(_)) => Forward::Busy,
        Err(TrySendError::Closed(_)) => Forward::Closed,
    }
}

/// GET /ws - upgrade to a conversation WebSocket.
pub async fn ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_socket(socket, state))
}

/// Pump frames between one socket and its conversation worker.
///
/// The session is removed from the registry when either side closes.
async fn run_socket(mut socket: WebSocket, state: AppState) {
    let (outbound_tx, mut outbound) = mpsc::channel(OUTBOUND_BUFFER);
    let (id, inbound) = state.spawn_session(outbound_tx);
    let max_length = state.config.server.max_message_length;
    info!(session = %id, "WebSocket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let rejected = match frames::decode(text.as_str(), max_length) {
                        Ok(event) => match forward(&inbound, event) {
                            Forward::Delivered => None,
                            Forward::Busy => Some(BUSY_MESSAGE.to_string()),
                            Forward::Closed => break,
                        },
                        Err(message) => Some(message),
                    };
                    if let Some(message) = rejected {
                        debug!(session = %id, %message, "Frame rejected");
                        let frame = frames::encode(&ServerFrame::Error { message });
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session = %id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
            outgoing = outbound.recv() => match outgoing {
                Some(event) => {
                    let frame = frames::encode(&ServerFrame::from(event));
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // The worker finished and every queued frame is delivered.
                None => break,
            },
        }
    }

    state.registry.remove(id);
    info!(session = %id, "WebSocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str) -> ClientEvent {
        ClientEvent::Utterance(text.to_string())
    }

    #[tokio::test]
    async fn test_forward_delivers() {
        let (tx, mut rx) = mpsc::channel(2);
        assert_eq!(forward(&tx, utterance("hi")), Forward::Delivered);
        assert_eq!(rx.recv().await, Some(utterance("hi")));
    }

    #[test]
    fn test_forward_full_queue_does_not_wait() {
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(forward(&tx, utterance("one")), Forward::Delivered);
        assert_eq!(forward(&tx, utterance("two")), Forward::Busy);
    }

    #[test]
    fn test_forward_to_finished_worker() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(forward(&tx, utterance("hi")), Forward::Closed);
    }
}
