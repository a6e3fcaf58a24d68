//! WhatsApp ↔ dialogue-runtime bridge.
//!
//! Receives WhatsApp Cloud API webhook deliveries, forwards each user
//! utterance to the dialogue backend, and renders the returned traces as
//! WhatsApp message primitives with fallback degradation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dialogue;
mod dispatch;
mod pipeline;
mod sender;
mod webhook;

use config::Config;
use dialogue::DialogueClient;
use dispatch::Dispatcher;
use pipeline::Relay;
use sender::WhatsAppSender;
use webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let http = reqwest::Client::new();
    let dialogue = DialogueClient::new(
        http.clone(),
        &config.dialogue_api_base,
        &config.dialogue_api_key,
    );
    let sender = WhatsAppSender::new(http, &config);
    let relay = Arc::new(Relay::new(dialogue, Dispatcher::new(sender)));

    let addr: std::net::SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind))?;
    let state = AppState {
        config: Arc::new(config),
        relay,
    };

    tracing::info!("bridge-whatsapp listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, webhook::router(state).into_make_service()).await?;
    Ok(())
}
