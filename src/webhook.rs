//! HTTP surface: verdict callbacks, wallet checks and health.
//!
//! Request handlers never touch the chat gateway. A verdict becomes a
//! [`CallbackJob`] on a channel; the callback worker runs each job on its own
//! task and hands the outcome back through the job's reply channel.

use crate::callback_handler::{CallbackHandler, Resolution, Verdict};
use crate::response::{ack_error, ack_success, health as health_body};
use crate::verifier::NftVerifier;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("callback processing is unavailable")]
    Unavailable,
}

impl WebhookError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) | Self::Internal(_) | Self::Unavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        log::error!("Webhook request failed: {}", self);
        (self.status_code(), Json(ack_error(&self.to_string()))).into_response()
    }
}

/// A verdict waiting for the callback worker.
pub struct CallbackJob {
    pub verdict: Verdict,
    pub reply: oneshot::Sender<anyhow::Result<Resolution>>,
}

/// Start the worker that drains callback jobs. Each job runs on its own task so
/// one slow user never holds up another.
pub fn spawn_callback_worker(handler: Arc<CallbackHandler>, capacity: usize) -> mpsc::Sender<CallbackJob> {
    let (tx, mut rx) = mpsc::channel::<CallbackJob>(capacity);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let result = handler.handle(&job.verdict).await;
                if let Err(e) = &result {
                    log::error!("Error processing verdict for user {}: {:#}", job.verdict.user_id, e);
                }
                // the caller may have gone away; the verdict was still applied
                let _ = job.reply.send(result);
            });
        }
        log::info!("Callback worker stopped");
    });
    tx
}

pub struct WebhookState {
    pub jobs: mpsc::Sender<CallbackJob>,
    pub verifier: Arc<dyn NftVerifier>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    tg_id: i64,
    has_nft: bool,
    username: Option<String>,
    wallet_address: Option<String>,
    nft_count: Option<u64>,
}

impl CallbackPayload {
    fn into_verdict(self) -> Verdict {
        Verdict {
            user_id: self.tg_id,
            username: self.username.unwrap_or_else(|| format!("user_{}", self.tg_id)),
            has_nft: self.has_nft,
            nft_count: self.nft_count.unwrap_or(0),
            wallet_address: self.wallet_address.unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WalletPayload {
    tg_id: i64,
    wallet_address: String,
    username: Option<String>,
}

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

async fn dispatch(state: &WebhookState, verdict: Verdict) -> Result<Resolution, WebhookError> {
    let (reply, outcome) = oneshot::channel();
    state
        .jobs
        .send(CallbackJob { verdict, reply })
        .await
        .map_err(|_| WebhookError::Unavailable)?;
    outcome
        .await
        .map_err(|_| WebhookError::Unavailable)?
        .map_err(|e| WebhookError::Internal(format!("{:#}", e)))
}

pub async fn verify_callback(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let payload: CallbackPayload = parse(&body)?;
    let resolution = dispatch(&state, payload.into_verdict()).await?;
    Ok(Json(ack_success(resolution.message())))
}

pub async fn verify_wallet(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let payload: WalletPayload = parse(&body)?;
    let check = state
        .verifier
        .verify(&payload.wallet_address)
        .await
        .map_err(|e| WebhookError::Internal(format!("{:#}", e)))?;

    let verdict = Verdict {
        user_id: payload.tg_id,
        username: payload.username.unwrap_or_else(|| format!("user_{}", payload.tg_id)),
        has_nft: check.ok,
        nft_count: check.nft_count,
        wallet_address: payload.wallet_address,
    };
    let resolution = dispatch(&state, verdict).await?;
    Ok(Json(json!({
        "status": "success",
        "message": resolution.message(),
        "has_nft": check.ok,
        "nft_count": check.nft_count,
    })))
}

pub async fn health() -> Json<Value> {
    Json(health_body())
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/verify_callback", post(verify_callback))
        .route("/verify_wallet", post(verify_wallet))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the webhook on `0.0.0.0:<port>` until the process exits.
pub async fn serve(port: u16, state: Arc<WebhookState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind webhook port {}", port))?;
    log::info!("Webhook server listening on 0.0.0.0:{}", port);
    axum::serve(listener, router(state))
        .await
        .context("webhook server stopped")
}
