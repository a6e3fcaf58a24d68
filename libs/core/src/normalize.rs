//! Extracts one normalized utterance from an inbound event.

use crate::event::{EventKind, InboundEvent};

/// Placeholder sent to the dialogue backend when media carries no caption.
pub const IMAGE_PLACEHOLDER: &str = "User sent an image";
pub const DOCUMENT_PLACEHOLDER: &str = "User sent a document";
/// Voice transcription is out of scope; audio always maps to this placeholder.
pub const AUDIO_PLACEHOLDER: &str = "User sent a voice message";

/// Outcome of normalizing one inbound event.
///
/// `Empty` and `Unsupported` are terminal skip outcomes, not errors: the
/// caller must not invoke the dialogue backend for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Non-empty utterance text, ready for the dialogue backend.
    Utterance(String),
    Empty,
    Unsupported,
}

/// Maps an inbound event to a single utterance string.
///
/// Interactive replies contribute their display title verbatim, never the
/// raw payload id. Media kinds fall back to a fixed placeholder when no
/// caption is present. Pure mapping, no side effects.
///
/// ```
/// use relay_core::{normalize, EventKind, InboundEvent, Normalized};
///
/// let event = InboundEvent {
///     from: "1".into(),
///     kind: EventKind::ButtonReply { title: "Yes".into() },
/// };
/// assert_eq!(normalize(&event), Normalized::Utterance("Yes".into()));
/// ```
pub fn normalize(event: &InboundEvent) -> Normalized {
    let text = match &event.kind {
        EventKind::Text { body } => body.clone(),
        EventKind::ButtonReply { title } => title.clone(),
        EventKind::ListReply { title } => title.clone(),
        EventKind::Image { caption } => caption
            .clone()
            .unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()),
        EventKind::Document { caption } => caption
            .clone()
            .unwrap_or_else(|| DOCUMENT_PLACEHOLDER.to_string()),
        EventKind::Audio => AUDIO_PLACEHOLDER.to_string(),
        EventKind::Unsupported { .. } => return Normalized::Unsupported,
    };

    if text.trim().is_empty() {
        Normalized::Empty
    } else {
        Normalized::Utterance(text)
    }
}
