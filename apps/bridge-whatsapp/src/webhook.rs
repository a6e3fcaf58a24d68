//! Webhook surface: Meta verification handshake, signature checks, and
//! fire-and-forget intake into the relay pipeline.
//!
//! ```text
//! Meta calls GET /webhook for the subscribe handshake and POST /webhook for
//! deliveries; each contained message is relayed in a detached task and the
//! delivery is acknowledged immediately.
//! ```

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use hmac::{Hmac, Mac};
use relay_core::WebhookMessage;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::config::Config;
use crate::pipeline::Relay;
use crate::sender::WhatsAppSender;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Arc<Relay<WhatsAppSender>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Deserialize)]
struct VerifyQs {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
}

async fn verify(State(state): State<AppState>, Query(q): Query<VerifyQs>) -> impl IntoResponse {
    if q.mode.as_deref() == Some("subscribe")
        && q.token.as_deref() == Some(state.config.verify_token.as_str())
    {
        (StatusCode::OK, q.challenge.unwrap_or_default())
    } else {
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    }
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    if let Some(secret) = state.config.app_secret.as_deref() {
        if !verify_signature(secret, &headers, &body) {
            tracing::warn!("invalid webhook signature");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("failed to decode payload: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Acknowledge before processing: each message gets its own detached task
    // and the transport never waits for pipeline completion.
    for message in extract_messages(&payload) {
        let relay = state.relay.clone();
        tokio::spawn(async move {
            relay.handle(message).await;
        });
    }

    StatusCode::OK
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn verify_signature(app_secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let sig = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !sig.starts_with("sha256=") {
        return false;
    }
    let provided = &sig[7..];
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    constant_time_eq(provided.as_bytes(), hex_encode(&digest).as_bytes())
}

/// Unwraps `entry[].changes[].value.messages[]`; anything that does not
/// deserialize is logged and skipped, never an error for the delivery.
fn extract_messages(value: &Value) -> Vec<WebhookMessage> {
    let mut out = Vec::new();
    let entries = match value.get("entry").and_then(|v| v.as_array()) {
        Some(entries) => entries,
        None => return out,
    };

    for entry in entries {
        let changes = match entry.get("changes").and_then(|v| v.as_array()) {
            Some(changes) => changes,
            None => continue,
        };
        for change in changes {
            let Some(value) = change.get("value") else {
                continue;
            };
            let Some(messages) = value.get("messages").and_then(|v| v.as_array()) else {
                continue;
            };
            for message in messages {
                match serde_json::from_value::<WebhookMessage>(message.clone()) {
                    Ok(msg) => out.push(msg),
                    Err(err) => tracing::warn!(error = %err, "unparseable inbound message"),
                }
            }
        }
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
