//! Grandmaster · Contest Coaching Backend
//!
//! - Axum HTTP + WebSocket API for the problem-solving front-end
//! - Model calls go through an OpenAI-compatible chat API
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : model credential (fallback API_KEY); can also be set at runtime
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : image transcription, default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : solutions and corrective analyses, default "gpt-4o"
//!   OPENAI_TIMEOUT_SECS : per-request timeout, default 120
//!   SESSION_IDLE_SECS   : HTTP sessions unused this long are dropped, default 3600
//!   CONFIG_PATH         : path to TOML config (prompts, mode instructions, languages)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod markdown;
mod feedback;
mod domain;
mod config;
mod prompt;
mod state;
mod protocol;
mod logic;
mod openai;
mod routes;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::{spawn_session_sweeper, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (sessions, prompts, model client).
  let state = Arc::new(AppState::new());

  // HTTP sessions have no disconnect to end them; expire the idle ones.
  let idle_secs = std::env::var("SESSION_IDLE_SECS")
    .ok()
    .and_then(|s| s.parse::<u64>().ok())
    .unwrap_or(3600);
  spawn_session_sweeper(state.clone(), Duration::from_secs(idle_secs));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "grandmaster_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "grandmaster_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "grandmaster_backend", "Shutdown signal received");
}
