//! WebSocket upgrade + message loop. Each connection owns one session; every client
//! message is parsed as JSON and forwarded to core logic. We reply with a single JSON
//! message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::AppError;
use crate::logic::*;
use crate::markdown::segment;
use crate::protocol::{answer_out, feedback_out, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "grandmaster_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let session_id = state.open_socket_session().await;
  info!(target: "grandmaster_backend", %session_id, "WebSocket connected");

  let hello = ServerWsMessage::Session { session_id: session_id.clone() };
  if send(&mut socket, &hello).await {
    while let Some(Ok(msg)) = socket.recv().await {
      match msg {
        Message::Text(txt) => {
          let reply_msg = reply_to(&txt, &state, &session_id).await;

          if !send(&mut socket, &reply_msg).await {
            break;
          }
        }
        Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
        Message::Close(_) => break,
        _ => {}
      }
    }
  }

  state.close_session(&session_id).await;
  info!(target: "grandmaster_backend", %session_id, "WebSocket disconnected");
}

/// Serialize and send; false when the socket is gone.
async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "error": "internal", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "grandmaster_backend", error = %e, "WS send error");
      false
    }
  }
}

/// Parse one text frame and dispatch it; failures become an `error` message.
async fn reply_to(txt: &str, state: &Arc<AppState>, session_id: &str) -> ServerWsMessage {
  match serde_json::from_str::<ClientWsMessage>(txt) {
    Ok(incoming) => {
      debug!(target: "grandmaster_backend", %session_id, "WS received: {:?}", &incoming);
      handle_client_ws(incoming, state, session_id)
        .await
        .unwrap_or_else(|e| ServerWsMessage::Error { error: e.kind(), message: e.to_string() })
    }
    Err(e) => ServerWsMessage::Error { error: "validation", message: format!("Invalid JSON: {}", e) },
  }
}

#[instrument(level = "info", skip(state, msg))]
async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, session_id: &str) -> Result<ServerWsMessage, AppError> {
  Ok(match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::SetApiKey { api_key } => {
      state.install_api_key(&api_key).await?;
      ServerWsMessage::CredentialSaved
    }

    ClientWsMessage::Solve(problem) => {
      let answer = solve(state, session_id, problem.into_input()).await?;
      tracing::info!(target: "solve", answer_id = %answer.id, generation = answer.generation, "WS answer served");
      ServerWsMessage::Answer { answer: answer_out(&answer) }
    }

    ClientWsMessage::Feedback { answer_id, verdict } => {
      let feedback = mark_feedback(state, session_id, &answer_id, verdict).await?;
      ServerWsMessage::Feedback { answer_id, feedback: feedback_out(&feedback) }
    }

    ClientWsMessage::SubmitCorrection { answer_id, accepted_code } => {
      let feedback = submit_correction(state, session_id, &answer_id, &accepted_code).await?;
      ServerWsMessage::Feedback { answer_id, feedback: feedback_out(&feedback) }
    }

    ClientWsMessage::ExtractImage { image, mime, current_problem } => {
      let out = extract_image(state, session_id, &image, mime.as_deref(), &current_problem).await?;
      ServerWsMessage::Extracted { text: out.text, problem: out.problem }
    }

    ClientWsMessage::Render { content } => ServerWsMessage::Rendered { blocks: segment(&content) },
  })
}
