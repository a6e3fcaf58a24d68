//! Process configuration, loaded once at startup.
//!
//! Every credential the bridge needs is resolved here and injected into the
//! client/sender constructors; pipeline code never reads the environment.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the WhatsApp Cloud API.
    pub wa_token: String,
    /// Phone-number resource id the bridge sends from.
    pub phone_number_id: String,
    /// Shared secret echoed back during the webhook verification handshake.
    pub verify_token: String,
    /// Meta app secret for `X-Hub-Signature-256` checks; verification is
    /// skipped when unset.
    pub app_secret: Option<String>,
    /// API key for the dialogue backend.
    pub dialogue_api_key: String,
    pub dialogue_api_base: String,
    pub graph_api_base: String,
    pub bind: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            wa_token: required("WHATSAPP_TOKEN")?,
            phone_number_id: required("WHATSAPP_PHONE_NUMBER_ID")?,
            verify_token: required("WHATSAPP_VERIFY_TOKEN")?,
            app_secret: std::env::var("WHATSAPP_APP_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            dialogue_api_key: required("DIALOGUE_API_KEY")?,
            dialogue_api_base: std::env::var("DIALOGUE_API_BASE")
                .unwrap_or_else(|_| "https://general-runtime.voiceflow.com".into()),
            graph_api_base: std::env::var("WA_API_BASE")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".into()),
            bind: std::env::var("BIND").unwrap_or_else(|_| "0.0.0.0:8080".into()),
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{name} is required"))
}
