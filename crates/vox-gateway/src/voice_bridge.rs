use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Instant;
use vox_core::IdentityHasher;
use vox_correlation::{reply_channel, CorrelationError, CorrelationHandle, ReplyWaitError};
use vox_directline::{BotBackend, BotBackendError, OutboundActivity};

use crate::progressive_response::{ProgressNotifier, ProgressTarget};
use crate::reply_composer::{
    compose_session_end_response, compose_voice_response, VoiceResponse, DEFAULT_REPROMPT_PHRASE,
};
use crate::voice_request::{VoiceRequestEnvelope, VoiceRoute};

mod api_error;
mod bridge_controller;
mod server_bootstrap;

pub use bridge_controller::BridgeController;
pub use server_bootstrap::{build_voice_bridge_router, run_voice_bridge_server};

use api_error::ApiError;

pub const MESSAGES_ENDPOINT: &str = "/messages";
pub const STATUS_ENDPOINT: &str = "/status";
pub const DEFAULT_RESPONSE_DEADLINE_MS: u64 = 8_000;
pub const DEFAULT_LOCALE: &str = "en-US";

#[derive(Debug, Error)]
/// Enumerates supported `BridgeError` values.
pub enum BridgeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("bot submission failed: {0}")]
    SubmissionFailed(#[from] BotBackendError),
    #[error("no bot reply within {waited_ms}ms")]
    ReplyTimedOut { waited_ms: u64 },
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `VoiceBridgeConfig` used across vox-bridge components.
pub struct VoiceBridgeConfig {
    pub response_deadline: Duration,
    pub reprompt_phrase: String,
    pub locale: String,
}

impl Default for VoiceBridgeConfig {
    fn default() -> Self {
        Self {
            response_deadline: Duration::from_millis(DEFAULT_RESPONSE_DEADLINE_MS),
            reprompt_phrase: DEFAULT_REPROMPT_PHRASE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Body of `GET /status`.
pub struct VoiceBridgeStatus {
    pub aggregation_mode: String,
    pub pending_requests: usize,
    pub buffered_keys: usize,
    pub dispatched_total: u64,
    pub missed_total: u64,
}

/// Shared router state.
pub struct VoiceBridgeState {
    pub(crate) controller: BridgeController,
}

impl VoiceBridgeState {
    pub fn new(controller: BridgeController) -> Self {
        Self { controller }
    }
}

async fn handle_messages(State(state): State<Arc<VoiceBridgeState>>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<VoiceRequestEnvelope>(&body) {
        Ok(request) => request,
        Err(error) => {
            return ApiError::bad_request(
                "malformed_json",
                format!("failed to parse request body: {error}"),
            )
            .into_response();
        }
    };
    match state.controller.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

async fn handle_status(State(state): State<Arc<VoiceBridgeState>>) -> Response {
    match state.controller.status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(error) => ApiError::from(BridgeError::from(error)).into_response(),
    }
}
