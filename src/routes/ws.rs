//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//! The caller identity is fixed at upgrade time from the request headers.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  http::HeaderMap,
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic;
use crate::protocol::{ClientWsMessage, Identity, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, headers))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
  let identity = Identity::from_headers(&headers);
  info!(target: "quizify_backend", uid = identity.as_ref().map(|i| i.uid.as_str()), "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, identity))
}

#[instrument(level = "info", skip(socket, state, identity))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, identity: Option<Identity>) {
  info!(target: "quizify_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "quizify_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, identity.as_ref()).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "quizify_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "quizify_backend", "WebSocket disconnected");
}

/// Dispatch one client message. Failures become `error` replies; the socket
/// stays open.
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, identity: Option<&Identity>) -> ServerWsMessage {
  let reply = match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),
    ClientWsMessage::Run { question_id, code } => logic::run_code(state, &question_id, &code).await.map(ServerWsMessage::RunResult),
    ClientWsMessage::Submit { question_id, code } => {
      logic::submit_code(state, &question_id, &code, identity).await.map(ServerWsMessage::SubmitResult)
    }
    ClientWsMessage::ToggleRevise { question_id } => logic::toggle(state, &question_id, identity).await.map(ServerWsMessage::Revise),
    ClientWsMessage::Playground { code } => Ok(ServerWsMessage::Playground(logic::playground(state, &code).await)),
  };
  reply.unwrap_or_else(|e| ServerWsMessage::Error { message: e.to_string() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::testing::{adder_state, identity, sum_question};
  use crate::store::DocumentStore;

  async fn state() -> AppState {
    let store = DocumentStore::in_memory();
    store.put_questions(vec![sum_question("easy-1")]).await.unwrap();
    adder_state(store)
  }

  fn parse(json: &str) -> ClientWsMessage {
    serde_json::from_str(json).unwrap()
  }

  #[tokio::test]
  async fn ping_gets_pong() {
    let state = state().await;
    assert!(matches!(handle_client_ws(parse(r#"{"type":"ping"}"#), &state, None).await, ServerWsMessage::Pong));
  }

  #[tokio::test]
  async fn run_reports_the_first_case() {
    let state = state().await;
    let msg = parse(r#"{"type":"run","questionId":"easy-1","code":"src"}"#);
    match handle_client_ws(msg, &state, None).await {
      ServerWsMessage::RunResult(out) => {
        assert_eq!(out.question_id, "easy-1");
        assert!(out.sample.map(|s| s.passed).unwrap_or(false));
      }
      other => panic!("unexpected reply: {other:?}"),
    }
  }

  #[tokio::test]
  async fn submit_records_the_solve() {
    let state = state().await;
    let msg = parse(r#"{"type":"submit","questionId":"easy-1","code":"src"}"#);
    match handle_client_ws(msg, &state, Some(&identity("u1"))).await {
      ServerWsMessage::SubmitResult(out) => {
        assert!(out.submission.all_passed);
        assert_eq!(out.persisted, Some(true));
      }
      other => panic!("unexpected reply: {other:?}"),
    }
    assert!(state.store.user("u1").await.unwrap().is_solved("easy-1"));
  }

  #[tokio::test]
  async fn toggle_revise_needs_identity() {
    let state = state().await;
    let toggle = r#"{"type":"toggle_revise","questionId":"easy-1"}"#;
    match handle_client_ws(parse(toggle), &state, Some(&identity("u1"))).await {
      ServerWsMessage::Revise(out) => assert!(out.flagged),
      other => panic!("unexpected reply: {other:?}"),
    }
    match handle_client_ws(parse(toggle), &state, None).await {
      ServerWsMessage::Error { message } => assert_eq!(message, "Sign in required"),
      other => panic!("unexpected reply: {other:?}"),
    }
  }

  #[tokio::test]
  async fn unknown_question_is_an_error_reply() {
    let state = state().await;
    let msg = parse(r#"{"type":"submit","questionId":"easy-404","code":"src"}"#);
    match handle_client_ws(msg, &state, Some(&identity("u1"))).await {
      ServerWsMessage::Error { message } => assert_eq!(message, "Unknown question: easy-404"),
      other => panic!("unexpected reply: {other:?}"),
    }
  }
}
