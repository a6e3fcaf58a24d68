//! Outbound sends against the WhatsApp Cloud API.
//!
//! One trait method per platform primitive. Each richer primitive degrades
//! through exactly one fallback tier on send failure (image → caption text,
//! buttons/list → numbered plain text) so the user is never left without a
//! response. Long text bodies become multiple wire sends.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use relay_core::{IMAGE_CAPTION_LIMIT, TEXT_CHUNK_LIMIT, chunk_text, truncate_chars};
use serde_json::{Value, json};

use crate::config::Config;

const TEXT_TIMEOUT: Duration = Duration::from_secs(10);
const MEDIA_TIMEOUT: Duration = Duration::from_secs(15);
const INDICATOR_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between chunks of one long text body.
const CHUNK_DELAY: Duration = Duration::from_millis(500);

const IMAGE_FALLBACK_TEXT: &str = "The bot sent an image, but it could not be delivered.";

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListSection {
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}

/// Sends one platform message per call. The dispatcher has already enforced
/// cardinality caps (≤3 buttons, ≤10 rows) and per-field truncation.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;
    async fn send_image(&self, to: &str, url: &str, caption: Option<&str>) -> Result<()>;
    async fn send_buttons(&self, to: &str, body: &str, buttons: &[ReplyButton]) -> Result<()>;
    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        action: &str,
        sections: &[ListSection],
    ) -> Result<()>;

    /// Best-effort processing indicator. Implementations must swallow
    /// failures; the pipeline never checks the outcome.
    async fn mark_processing(&self, _message_id: &str) {}
}

pub struct WhatsAppSender {
    http: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    token: String,
}

impl WhatsAppSender {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_base: config.graph_api_base.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            token: config.wa_token.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    async fn post(&self, payload: &Value, timeout: Duration) -> Result<()> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("whatsapp send failed: status={} body={}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundSender for WhatsAppSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let chunks = chunk_text(body, TEXT_CHUNK_LIMIT);
        let total = chunks.len();
        let mut delivered = 0usize;
        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
            // Partial delivery of a long message beats none, so later chunks
            // are attempted even when an earlier one fails.
            match self.post(&text_payload(to, chunk), TEXT_TIMEOUT).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(error = %err, chunk = index, "text chunk failed, continuing")
                }
            }
        }
        if delivered == 0 && total > 0 {
            bail!("all {} text chunks failed", total);
        }
        Ok(())
    }

    async fn send_image(&self, to: &str, url: &str, caption: Option<&str>) -> Result<()> {
        match self
            .post(&image_payload(to, url, caption), MEDIA_TIMEOUT)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "image send failed, falling back to text");
                let fallback = caption
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or(IMAGE_FALLBACK_TEXT);
                self.send_text(to, fallback).await
            }
        }
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[ReplyButton]) -> Result<()> {
        match self
            .post(&buttons_payload(to, body, buttons), TEXT_TIMEOUT)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "buttons send failed, falling back to text");
                self.send_text(to, &render_buttons_fallback(body, buttons))
                    .await
            }
        }
    }

    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        action: &str,
        sections: &[ListSection],
    ) -> Result<()> {
        match self
            .post(&list_payload(to, header, body, action, sections), MEDIA_TIMEOUT)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "list send failed, falling back to text");
                self.send_text(to, &render_list_fallback(body, sections))
                    .await
            }
        }
    }

    async fn mark_processing(&self, message_id: &str) {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        if let Err(err) = self.post(&payload, INDICATOR_TIMEOUT).await {
            tracing::info!(error = %err, "read receipt failed, ignoring");
        }
    }
}

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": true, "body": body }
    })
}

fn image_payload(to: &str, url: &str, caption: Option<&str>) -> Value {
    let mut image = json!({ "link": url });
    if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
        image["caption"] = json!(truncate_chars(caption, IMAGE_CAPTION_LIMIT));
    }
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "image",
        "image": image
    })
}

fn buttons_payload(to: &str, body: &str, buttons: &[ReplyButton]) -> Value {
    let buttons: Vec<Value> = buttons
        .iter()
        .map(|b| {
            json!({
                "type": "reply",
                "reply": { "id": b.id, "title": b.title }
            })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons }
        }
    })
}

fn list_payload(
    to: &str,
    header: &str,
    body: &str,
    action: &str,
    sections: &[ListSection],
) -> Value {
    let sections: Vec<Value> = sections
        .iter()
        .map(|section| {
            let rows: Vec<Value> = section
                .rows
                .iter()
                .map(|row| {
                    let mut value = json!({ "id": row.id, "title": row.title });
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            match &section.title {
                Some(title) => json!({ "title": title, "rows": rows }),
                None => json!({ "rows": rows }),
            }
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "header": { "type": "text", "text": header },
            "body": { "text": body },
            "action": { "button": action, "sections": sections }
        }
    })
}

/// Plain-text rendering used when the interactive-buttons send fails.
fn render_buttons_fallback(body: &str, buttons: &[ReplyButton]) -> String {
    let mut lines = vec![body.to_string()];
    lines.push(String::new());
    for (index, button) in buttons.iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, button.title));
    }
    lines.join("\n")
}

/// Plain-text rendering of every row across every section, numbered.
fn render_list_fallback(body: &str, sections: &[ListSection]) -> String {
    let mut lines = vec![body.to_string()];
    lines.push(String::new());
    let mut number = 1usize;
    for section in sections {
        for row in &section.rows {
            match &row.description {
                Some(description) => {
                    lines.push(format!("{}. {} - {}", number, row.title, description))
                }
                None => lines.push(format!("{}. {}", number, row.title)),
            }
            number += 1;
        }
    }
    lines.join("\n")
}
