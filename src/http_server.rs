//! # Feature: HTTP Interactions Endpoint
//!
//! Receives interactions by webhook instead of the gateway. Every request is
//! checked against the application's ed25519 public key; commands are
//! acknowledged with a deferred response and run in the background.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: true (run `http_bot` instead of `bot`)
//!
//! ## Changelog
//! - 2.0.0: Commands go through the dispatcher, answered by editing the deferred response
//! - 1.0.0: Signature verification and canned answers

use anyhow::{anyhow, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::dispatcher::{Dispatcher, InteractionPayload, APPLICATION_COMMAND, PING};
use crate::interaction::{ResponseState, DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE, PONG};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub public_key: VerifyingKey,
}

pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| {
        error!("❌ Failed to decode Discord public key as hex: {}", e);
        anyhow!("Failed to decode Discord public key: {}", e)
    })?;
    let len = bytes.len();
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        error!("❌ Public key must be exactly 32 bytes, got {}", len);
        anyhow!("Public key must be 32 bytes")
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| {
        error!("❌ Invalid Discord public key format: {}", e);
        anyhow!("Invalid Discord public key: {}", e)
    })
}

pub fn create_server(config: &Config, dispatcher: Arc<Dispatcher>) -> Result<Router> {
    info!("🔑 Loading Discord public key for signature verification");
    let discord_public_key = config.discord_public_key.as_ref().ok_or_else(|| {
        anyhow!("DISCORD_PUBLIC_KEY environment variable is required for HTTP interactions")
    })?;
    let public_key = parse_public_key(discord_public_key)?;
    info!("✅ Discord public key loaded and validated successfully");

    Ok(router(AppState {
        dispatcher,
        public_key,
    }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/interactions", post(handle_interaction))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Tag bridge HTTP server is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn handle_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    let request_id = uuid::Uuid::new_v4();
    debug!("[{}] 📥 HTTP interaction received | Body length: {}", request_id, body.len());

    if let Err(e) = verify_discord_signature(&state.public_key, &headers, &body) {
        warn!("[{}] 🚫 Signature verification failed: {}", request_id, e);
        return Err(StatusCode::UNAUTHORIZED);
    }

    let interaction: InteractionPayload = serde_json::from_slice(&body).map_err(|e| {
        let raw: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        state.dispatcher.report_event_error(&e.into(), &raw);
        StatusCode::BAD_REQUEST
    })?;

    match interaction.kind {
        PING => {
            info!("[{}] 🏓 Received ping interaction", request_id);
            Ok(Json(json!({ "type": PONG })))
        }
        APPLICATION_COMMAND => {
            debug!("[{}] Deferring interaction {}", request_id, interaction.id);
            let dispatcher = state.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch_interaction(interaction, ResponseState::Deferred { hidden: false })
                    .await;
            });
            Ok(Json(json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE })))
        }
        other => {
            warn!("[{}] Unsupported interaction type: {}", request_id, other);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

fn verify_discord_signature(public_key: &VerifyingKey, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let signature_header = headers
        .get("x-signature-ed25519")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| anyhow!("Missing signature header"))?;
    let timestamp_header = headers
        .get("x-signature-timestamp")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| anyhow!("Missing timestamp header"))?;

    let signature_bytes =
        hex::decode(signature_header).map_err(|e| anyhow!("Invalid signature format: {}", e))?;
    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| anyhow!("Signature must be 64 bytes"))?;
    let signature = Signature::from_bytes(&signature_array);

    let message = [timestamp_header.as_bytes(), body].concat();
    public_key
        .verify(&message, &signature)
        .map_err(|e| anyhow!("Signature verification failed: {}", e))
}

pub async fn start_http_server(config: Config, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let app = create_server(&config, dispatcher)?;
    let port = config.http_port;

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| anyhow!("Failed to bind to port {}: {}", port, e))?;

    info!("🌐 HTTP server listening on port {}", port);
    info!("📡 Interactions endpoint: http://0.0.0.0:{}/interactions", port);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
