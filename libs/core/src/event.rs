//! Inbound message model for the WhatsApp Cloud API webhook.
//!
//! [`WebhookMessage`] mirrors the wire shape of one entry in
//! `entry[].changes[].value.messages[]`. [`InboundEvent`] is the closed,
//! classified form the rest of the pipeline works with; anything the bridge
//! does not understand collapses into [`EventKind::Unsupported`] instead of
//! failing the webhook delivery.

use serde::Deserialize;

/// One inbound message as delivered by the webhook, before classification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub interactive: Option<InteractiveReply>,
    #[serde(default)]
    pub image: Option<MediaContent>,
    #[serde(default)]
    pub document: Option<MediaContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// Reply to an interactive message. Exactly one of the two reply objects is
/// present depending on `type` (`button_reply` or `list_reply`).
#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveReply {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub button_reply: Option<ReplyItem>,
    #[serde(default)]
    pub list_reply: Option<ReplyItem>,
}

/// The selected button or list row. `title` is the user-visible text and is
/// what flows downstream; `id` is only a correlation key.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaContent {
    #[serde(default)]
    pub caption: Option<String>,
}

/// One classified inbound event, scoped to a single webhook delivery.
///
/// ```
/// use relay_core::{EventKind, InboundEvent};
///
/// let event = InboundEvent {
///     from: "15551234567".into(),
///     kind: EventKind::Text { body: "hello".into() },
/// };
/// assert_eq!(event.from, "15551234567");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Opaque sender identity, shared with the dialogue backend as the
    /// per-user session key and used as the outbound delivery address.
    pub from: String,
    pub kind: EventKind,
}

/// Closed set of inbound event kinds the bridge understands.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Text { body: String },
    ButtonReply { title: String },
    ListReply { title: String },
    Image { caption: Option<String> },
    Document { caption: Option<String> },
    Audio,
    Unsupported { kind: String },
}

impl From<WebhookMessage> for InboundEvent {
    fn from(msg: WebhookMessage) -> Self {
        let kind = match msg.kind.as_str() {
            "text" => match msg.text {
                Some(text) => EventKind::Text { body: text.body },
                None => EventKind::Unsupported { kind: msg.kind },
            },
            "interactive" => match msg.interactive {
                Some(reply) => classify_interactive(reply),
                None => EventKind::Unsupported { kind: msg.kind },
            },
            "image" => EventKind::Image {
                caption: msg.image.and_then(|m| m.caption),
            },
            "document" => EventKind::Document {
                caption: msg.document.and_then(|m| m.caption),
            },
            "audio" => EventKind::Audio,
            _ => EventKind::Unsupported { kind: msg.kind },
        };
        InboundEvent {
            from: msg.from,
            kind,
        }
    }
}

fn classify_interactive(reply: InteractiveReply) -> EventKind {
    match reply.kind.as_str() {
        "button_reply" => match reply.button_reply {
            Some(item) => EventKind::ButtonReply { title: item.title },
            None => EventKind::Unsupported {
                kind: "interactive".into(),
            },
        },
        "list_reply" => match reply.list_reply {
            Some(item) => EventKind::ListReply { title: item.title },
            None => EventKind::Unsupported {
                kind: "interactive".into(),
            },
        },
        other => EventKind::Unsupported {
            kind: format!("interactive/{other}"),
        },
    }
}
