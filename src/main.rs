//! Quizify backend server.
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   QUIZIFY_CONFIG_PATH   : path to TOML config
//!   QUIZIFY_DATA_PATH     : JSON snapshot file for questions and progress
//!   QUIZIFY_QUESTIONS_PATH: question seed file used when the store is empty
//!   QUIZIFY_RUNTIME       : "local" (default) or "remote"
//!   QUIZIFY_PYTHON        : interpreter for the local runtime (default "python3")
//!   QUIZIFY_RUNTIME_URL   : Piston base URL for the remote runtime
//!   QUIZIFY_TIMEOUT_MS    : per-execution limit (default 3000)
//!   QUIZIFY_ADMIN_EMAILS  : comma-separated admin emails
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use quizify_backend::config::AppConfig;
use quizify_backend::routes::build_router;
use quizify_backend::state::AppState;
use quizify_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  telemetry::init_tracing();

  let config = AppConfig::load();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

  // Store, question bank and runtime handle.
  let state = Arc::new(AppState::from_config(config).await?);

  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizify_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "quizify_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "quizify_backend", error = %e, "Failed to listen for ctrl-c; running until killed");
    std::future::pending::<()>().await;
  }
}
