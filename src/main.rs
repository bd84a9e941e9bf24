//! HDU vocabulary quiz auto-answer backend
//!
//! - Axum HTTP API (`/api/v1/start-test`, `/api/v1/login-and-start`, `/api/v1/health`)
//! - Campus SSO login (CAS page scrape + AES-encrypted password)
//! - Tiered answers: learned answer bank, word list, OpenAI-compatible model
//! - Post-submission learning into a JSON answer bank
//!
//! Important env variables:
//!   APP_CONFIG_PATH : path to TOML config (default "config/config.toml")
//!   HDU_APP_*       : per-key overrides, e.g. HDU_APP_AI_SERVICE_API_KEY, HDU_APP_SERVER_PORT
//!   LOG_LEVEL       : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod crypto;
mod fingerprint;
mod dictionary;
mod answer_bank;
mod auth;
mod quiz_api;
mod openai;
mod ai;
mod resolver;
mod scheduler;
mod learning;
mod exam;
mod state;
mod protocol;
mod routes;
#[cfg(test)]
mod test_support;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = AppConfig::load().map_err(|e| {
    error!(target: "autoword_backend", error = %e, "Failed to load configuration");
    e
  })?;

  // Word list, answer bank and outbound clients; a missing word list is fatal.
  let state = Arc::new(AppState::from_config(&cfg).await.map_err(|e| {
    error!(target: "autoword_backend", error = %e, "Failed to initialise application state");
    e
  })?);

  let app = build_router(state, &cfg.cors);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "autoword_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "autoword_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "autoword_backend", "Shutdown signal received");
}
