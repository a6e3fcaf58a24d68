//! Dialogue backend response traces.
//!
//! One dialogue turn yields an ordered array of traces; order is delivery
//! order and must be preserved. The enum is closed: wire kinds the bridge
//! does not render deserialize into [`Trace::Other`] and are skipped
//! downstream.

use serde::Deserialize;

/// One unit of the dialogue backend's turn response.
///
/// ```
/// use relay_core::Trace;
///
/// let trace: Trace = serde_json::from_value(serde_json::json!({
///     "type": "text",
///     "payload": { "message": "Hello!" }
/// })).unwrap();
/// assert!(matches!(trace, Trace::Text { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Trace {
    #[serde(rename = "text")]
    Text { payload: TextPayload },
    /// Speech output; flattened to text by the dispatcher (no synthesis).
    #[serde(rename = "speak")]
    Speak { payload: TextPayload },
    #[serde(rename = "visual")]
    Visual { payload: VisualPayload },
    #[serde(rename = "carousel")]
    Carousel { payload: CarouselPayload },
    #[serde(rename = "choice")]
    Choice { payload: ChoicePayload },
    #[serde(rename = "cardV2", alias = "card")]
    Card { payload: CardPayload },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct TextPayload {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct VisualPayload {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct CarouselPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

/// One card within a carousel (or a standalone card trace payload).
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Card {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Description>,
    #[serde(default, rename = "imageUrl")]
    pub image_url: Option<String>,
}

impl Card {
    /// Description text, if present and non-blank.
    pub fn description_text(&self) -> Option<&str> {
        self.description
            .as_ref()
            .map(|d| d.text())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Card descriptions arrive either as a plain string or as a rich object
/// with a `text` field; both shapes collapse to the plain text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Structured {
        #[serde(default)]
        text: String,
    },
    Plain(String),
}

impl Description {
    pub fn text(&self) -> &str {
        match self {
            Description::Structured { text } => text,
            Description::Plain(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ChoicePayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

/// One choice option. `name` is the display text; the associated request
/// may carry a label used as a secondary line in list fallbacks.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Button {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub request: Option<ButtonRequest>,
}

impl Button {
    pub fn label(&self) -> Option<&str> {
        self.request
            .as_ref()
            .and_then(|r| r.payload.as_ref())
            .and_then(|p| p.label.as_deref())
            .filter(|l| !l.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ButtonRequest {
    #[serde(default)]
    pub payload: Option<ButtonRequestPayload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ButtonRequestPayload {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct CardPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Description>,
    #[serde(default, rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// Deserializes one element of the backend's trace array, mapping malformed
/// elements to [`Trace::Other`] so a single bad trace never poisons the turn.
pub fn trace_from_value(value: &serde_json::Value) -> Trace {
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        tracing::info!(error = %err, "unparseable trace, skipping");
        Trace::Other
    })
}
