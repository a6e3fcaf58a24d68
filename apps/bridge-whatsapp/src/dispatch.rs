//! Maps ordered dialogue traces onto WhatsApp message primitives.
//!
//! The platform caps interactive messages hard (3 reply buttons, 10 list
//! rows), which forces a degrade-by-cardinality strategy: choices render as
//! buttons up to three options and as a list beyond that; carousels render
//! as a single rich message for one card and as a list for several. Every
//! trace is isolated: a failed send never aborts the rest of the turn.

use std::time::Duration;

use anyhow::Result;
use relay_core::{
    BUTTON_COUNT_LIMIT, BUTTON_TITLE_LIMIT, Card, CardPayload, CarouselPayload, ChoicePayload,
    LIST_ROW_DESCRIPTION_LIMIT, LIST_ROW_LIMIT, LIST_ROW_TITLE_LIMIT, Trace, truncate_chars,
};
use time::OffsetDateTime;

use crate::sender::{ListRow, ListSection, OutboundSender, ReplyButton};

/// Pause between consecutive sends of one turn, to stay under platform
/// rate limits. Skipped traces do not pay it.
const PACING_DELAY: Duration = Duration::from_millis(500);

const NO_RESPONSE_TEXT: &str = "No response is available right now. Please try again.";
const DEFAULT_CHOICE_PROMPT: &str = "Please choose an option:";
const LIST_HEADER: &str = "Options";
const CAROUSEL_PROMPT: &str = "Select an option to continue.";
const CAROUSEL_ACTION: &str = "View options";
const CHOICE_ACTION: &str = "Choose";

pub struct Dispatcher<S> {
    sender: S,
    pacing: Duration,
}

impl<S: OutboundSender> Dispatcher<S> {
    pub fn new(sender: S) -> Self {
        Self::with_pacing(sender, PACING_DELAY)
    }

    pub fn with_pacing(sender: S, pacing: Duration) -> Self {
        Self { sender, pacing }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Delivers one turn's traces to `to`, in order. Never fails; per-trace
    /// errors are logged and the remaining traces are still attempted.
    pub async fn dispatch(&self, to: &str, traces: &[Trace]) {
        if traces.is_empty() {
            if let Err(err) = self.sender.send_text(to, NO_RESPONSE_TEXT).await {
                tracing::warn!(error = %err, "failed to send no-response fallback");
            }
            return;
        }

        // Pacing is keyed to actual sends, not trace positions, so skipped
        // traces never insert a dead pause. A failed attempt still counts.
        let mut sent_any = false;
        for trace in traces {
            match self.dispatch_one(to, trace, sent_any).await {
                Ok(sent) => sent_any = sent_any || sent,
                Err(err) => {
                    sent_any = true;
                    tracing::warn!(error = %err, "failed to deliver trace, continuing with next");
                }
            }
        }
    }

    async fn gap(&self, pace: bool) {
        if pace {
            tokio::time::sleep(self.pacing).await;
        }
    }

    /// Returns whether the trace produced at least one outbound send.
    async fn dispatch_one(&self, to: &str, trace: &Trace, pace: bool) -> Result<bool> {
        match trace {
            Trace::Text { payload } | Trace::Speak { payload } => {
                if payload.message.trim().is_empty() {
                    return Ok(false);
                }
                self.gap(pace).await;
                self.sender.send_text(to, &payload.message).await?;
                Ok(true)
            }
            Trace::Visual { payload } => match payload.image.as_deref() {
                Some(url) => {
                    self.gap(pace).await;
                    self.sender.send_image(to, url, None).await?;
                    Ok(true)
                }
                None => {
                    tracing::info!("visual trace without image url, skipping");
                    Ok(false)
                }
            },
            Trace::Carousel { payload } => self.send_carousel(to, payload, pace).await,
            Trace::Choice { payload } => self.send_choice(to, payload, pace).await,
            Trace::Card { payload } => {
                let text = flatten_card(payload);
                if text.is_empty() {
                    return Ok(false);
                }
                self.gap(pace).await;
                self.sender.send_text(to, &text).await?;
                Ok(true)
            }
            Trace::Other => {
                tracing::info!("unsupported trace kind, skipping");
                Ok(false)
            }
        }
    }

    async fn send_carousel(
        &self,
        to: &str,
        payload: &CarouselPayload,
        mut pace: bool,
    ) -> Result<bool> {
        if payload.cards.is_empty() {
            return Ok(false);
        }

        let mut sent = false;
        if let Some(title) = payload.title.as_deref().filter(|t| !t.trim().is_empty()) {
            self.gap(pace).await;
            self.sender.send_text(to, title).await?;
            pace = true;
            sent = true;
        }

        if let [card] = payload.cards.as_slice() {
            let caption = compose_card_caption(card);
            return match card.image_url.as_deref() {
                Some(url) => {
                    self.gap(pace).await;
                    self.sender.send_image(to, url, Some(&caption)).await?;
                    Ok(true)
                }
                None if caption.is_empty() => Ok(sent),
                None => {
                    self.gap(pace).await;
                    self.sender.send_text(to, &caption).await?;
                    Ok(true)
                }
            };
        }

        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let rows: Vec<ListRow> = payload
            .cards
            .iter()
            .take(LIST_ROW_LIMIT)
            .enumerate()
            .map(|(index, card)| ListRow {
                id: format!("card-{index}-{stamp}"),
                title: row_title(card.title.as_deref(), index),
                description: card
                    .description_text()
                    .map(|d| truncate_chars(d, LIST_ROW_DESCRIPTION_LIMIT)),
            })
            .collect();
        let sections = vec![ListSection { title: None, rows }];
        self.gap(pace).await;
        self.sender
            .send_list(to, LIST_HEADER, CAROUSEL_PROMPT, CAROUSEL_ACTION, &sections)
            .await?;
        Ok(true)
    }

    async fn send_choice(&self, to: &str, payload: &ChoicePayload, pace: bool) -> Result<bool> {
        if payload.buttons.is_empty() {
            return Ok(false);
        }
        let prompt = payload
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_CHOICE_PROMPT);

        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        if payload.buttons.len() <= BUTTON_COUNT_LIMIT {
            let buttons: Vec<ReplyButton> = payload
                .buttons
                .iter()
                .enumerate()
                .map(|(index, button)| ReplyButton {
                    id: format!("btn-{index}-{stamp}"),
                    title: truncate_chars(&button.name, BUTTON_TITLE_LIMIT),
                })
                .collect();
            self.gap(pace).await;
            self.sender.send_buttons(to, prompt, &buttons).await?;
            return Ok(true);
        }

        let rows: Vec<ListRow> = payload
            .buttons
            .iter()
            .take(LIST_ROW_LIMIT)
            .enumerate()
            .map(|(index, button)| ListRow {
                id: format!("btn-{index}-{stamp}"),
                title: row_title(Some(button.name.as_str()), index),
                description: button
                    .label()
                    .map(|l| truncate_chars(l, LIST_ROW_DESCRIPTION_LIMIT)),
            })
            .collect();
        let sections = vec![ListSection { title: None, rows }];
        self.gap(pace).await;
        self.sender
            .send_list(to, LIST_HEADER, prompt, CHOICE_ACTION, &sections)
            .await?;
        Ok(true)
    }
}

fn row_title(title: Option<&str>, index: usize) -> String {
    match title.filter(|t| !t.trim().is_empty()) {
        Some(title) => truncate_chars(title, LIST_ROW_TITLE_LIMIT),
        None => format!("Option {}", index + 1),
    }
}

/// Caption for a single-card carousel: bolded title plus description.
fn compose_card_caption(card: &Card) -> String {
    let mut parts = Vec::new();
    if let Some(title) = card.title.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("*{title}*"));
    }
    if let Some(description) = card.description_text() {
        parts.push(description.to_string());
    }
    parts.join("\n")
}

/// Flattens a card trace into paragraphs; blank fields are skipped.
fn flatten_card(payload: &CardPayload) -> String {
    let mut parts = Vec::new();
    if let Some(title) = payload.title.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(title.to_string());
    }
    if let Some(description) = payload
        .description
        .as_ref()
        .map(|d| d.text())
        .filter(|t| !t.trim().is_empty())
    {
        parts.push(description.to_string());
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use relay_core::{Button, ButtonRequest, ButtonRequestPayload, Description, TextPayload};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Image {
            url: String,
            caption: Option<String>,
        },
        Buttons {
            body: String,
            buttons: Vec<ReplyButton>,
        },
        List {
            header: String,
            body: String,
            action: String,
            rows: Vec<ListRow>,
        },
    }

    /// Records every attempted send; text sends whose body contains the
    /// configured marker fail after being recorded.
    #[derive(Default)]
    struct RecordingSender {
        calls: Mutex<Vec<Sent>>,
        fail_text_containing: Option<String>,
    }

    impl RecordingSender {
        fn failing_on(marker: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_text_containing: Some(marker.to_string()),
            }
        }

        fn calls(&self) -> Vec<Sent> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send_text(&self, _to: &str, body: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Sent::Text(body.to_string()));
            if let Some(marker) = &self.fail_text_containing {
                if body.contains(marker.as_str()) {
                    bail!("simulated send failure");
                }
            }
            Ok(())
        }

        async fn send_image(&self, _to: &str, url: &str, caption: Option<&str>) -> Result<()> {
            self.calls.lock().unwrap().push(Sent::Image {
                url: url.to_string(),
                caption: caption.map(|c| c.to_string()),
            });
            Ok(())
        }

        async fn send_buttons(
            &self,
            _to: &str,
            body: &str,
            buttons: &[ReplyButton],
        ) -> Result<()> {
            self.calls.lock().unwrap().push(Sent::Buttons {
                body: body.to_string(),
                buttons: buttons.to_vec(),
            });
            Ok(())
        }

        async fn send_list(
            &self,
            _to: &str,
            header: &str,
            body: &str,
            action: &str,
            sections: &[ListSection],
        ) -> Result<()> {
            self.calls.lock().unwrap().push(Sent::List {
                header: header.to_string(),
                body: body.to_string(),
                action: action.to_string(),
                rows: sections.iter().flat_map(|s| s.rows.clone()).collect(),
            });
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher<RecordingSender> {
        Dispatcher::with_pacing(RecordingSender::default(), Duration::ZERO)
    }

    fn text_trace(message: &str) -> Trace {
        Trace::Text {
            payload: TextPayload {
                message: message.into(),
            },
        }
    }

    fn named_button(name: &str) -> Button {
        Button {
            name: name.into(),
            request: None,
        }
    }

    fn choice(message: Option<&str>, names: &[&str]) -> Trace {
        Trace::Choice {
            payload: ChoicePayload {
                message: message.map(|m| m.to_string()),
                buttons: names.iter().copied().map(named_button).collect(),
            },
        }
    }

    fn card(title: Option<&str>, description: Option<&str>, image_url: Option<&str>) -> Card {
        Card {
            title: title.map(|t| t.to_string()),
            description: description.map(|d| Description::Plain(d.to_string())),
            image_url: image_url.map(|u| u.to_string()),
        }
    }

    fn carousel(title: Option<&str>, cards: Vec<Card>) -> Trace {
        Trace::Carousel {
            payload: CarouselPayload {
                title: title.map(|t| t.to_string()),
                cards,
            },
        }
    }

    #[tokio::test]
    async fn text_trace_sends_one_text() {
        let d = dispatcher();
        d.dispatch("1", &[text_trace("Hello!")]).await;
        assert_eq!(d.sender().calls(), vec![Sent::Text("Hello!".into())]);
    }

    #[tokio::test]
    async fn speak_trace_flattens_to_text() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Speak {
                payload: TextPayload {
                    message: "Spoken line".into(),
                },
            }],
        )
        .await;
        assert_eq!(d.sender().calls(), vec![Sent::Text("Spoken line".into())]);
    }

    #[tokio::test]
    async fn blank_text_trace_sends_nothing() {
        let d = dispatcher();
        d.dispatch("1", &[text_trace("   ")]).await;
        assert!(d.sender().calls().is_empty());
    }

    #[tokio::test]
    async fn empty_turn_sends_no_response_fallback() {
        let d = dispatcher();
        d.dispatch("1", &[]).await;
        assert_eq!(d.sender().calls(), vec![Sent::Text(NO_RESPONSE_TEXT.into())]);
    }

    #[tokio::test]
    async fn visual_with_url_sends_image() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Visual {
                payload: relay_core::VisualPayload {
                    image: Some("https://example.com/pic.png".into()),
                },
            }],
        )
        .await;
        assert_eq!(
            d.sender().calls(),
            vec![Sent::Image {
                url: "https://example.com/pic.png".into(),
                caption: None,
            }]
        );
    }

    #[tokio::test]
    async fn visual_without_url_is_skipped() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Visual {
                payload: relay_core::VisualPayload { image: None },
            }],
        )
        .await;
        assert!(d.sender().calls().is_empty());
    }

    #[tokio::test]
    async fn card_trace_flattens_fields_into_paragraphs() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Card {
                payload: CardPayload {
                    title: Some("Receipt".into()),
                    description: Some(Description::Structured {
                        text: "Paid in full".into(),
                    }),
                    image_url: None,
                },
            }],
        )
        .await;
        assert_eq!(
            d.sender().calls(),
            vec![Sent::Text("Receipt\n\nPaid in full".into())]
        );
    }

    #[tokio::test]
    async fn blank_card_trace_sends_nothing() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Card {
                payload: CardPayload {
                    title: Some("  ".into()),
                    description: None,
                    image_url: None,
                },
            }],
        )
        .await;
        assert!(d.sender().calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_trace_is_skipped_silently() {
        let d = dispatcher();
        d.dispatch("1", &[Trace::Other, text_trace("after")]).await;
        assert_eq!(d.sender().calls(), vec![Sent::Text("after".into())]);
    }

    #[tokio::test]
    async fn skipped_traces_do_not_delay_the_next_send() {
        let d = Dispatcher::with_pacing(RecordingSender::default(), Duration::from_millis(250));
        let start = std::time::Instant::now();
        d.dispatch("1", &[Trace::Other, Trace::Other, text_trace("after")])
            .await;
        assert!(
            start.elapsed() < Duration::from_millis(200),
            "skips should not pay the pacing delay, took {:?}",
            start.elapsed()
        );
        assert_eq!(d.sender().calls(), vec![Sent::Text("after".into())]);
    }

    #[tokio::test]
    async fn consecutive_sends_are_paced() {
        let d = Dispatcher::with_pacing(RecordingSender::default(), Duration::from_millis(50));
        let start = std::time::Instant::now();
        d.dispatch("1", &[text_trace("one"), Trace::Other, text_trace("two")])
            .await;
        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "two sends must be separated by the pacing delay"
        );
        assert_eq!(
            d.sender().calls(),
            vec![Sent::Text("one".into()), Sent::Text("two".into())]
        );
    }

    #[tokio::test]
    async fn send_failure_does_not_abort_remaining_traces() {
        let d = Dispatcher::with_pacing(RecordingSender::failing_on("FAIL"), Duration::ZERO);
        d.dispatch(
            "1",
            &[text_trace("first"), text_trace("FAIL here"), text_trace("third")],
        )
        .await;
        assert_eq!(
            d.sender().calls(),
            vec![
                Sent::Text("first".into()),
                Sent::Text("FAIL here".into()),
                Sent::Text("third".into()),
            ]
        );
    }

    #[tokio::test]
    async fn three_buttons_stay_interactive_buttons() {
        let d = dispatcher();
        d.dispatch("1", &[choice(Some("Continue?"), &["A", "B", "C"])])
            .await;
        let calls = d.sender().calls();
        let Sent::Buttons { body, buttons } = &calls[0] else {
            panic!("expected buttons send, got {calls:?}");
        };
        assert_eq!(body, "Continue?");
        assert_eq!(
            buttons.iter().map(|b| b.title.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
    }

    #[tokio::test]
    async fn four_buttons_degrade_to_list() {
        let d = dispatcher();
        d.dispatch("1", &[choice(None, &["A", "B", "C", "D"])]).await;
        let calls = d.sender().calls();
        assert!(matches!(calls[0], Sent::List { .. }), "got {calls:?}");
    }

    #[tokio::test]
    async fn five_named_buttons_render_as_choose_list() {
        let d = dispatcher();
        d.dispatch("1", &[choice(Some("Pick one"), &["A", "B", "C", "D", "E"])])
            .await;
        let calls = d.sender().calls();
        assert_eq!(calls.len(), 1);
        let Sent::List {
            body, action, rows, ..
        } = &calls[0]
        else {
            panic!("expected list send, got {calls:?}");
        };
        assert_eq!(body, "Pick one");
        assert_eq!(action, CHOICE_ACTION);
        assert_eq!(
            rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C", "D", "E"]
        );
    }

    #[tokio::test]
    async fn choice_list_rows_carry_button_labels() {
        let buttons = vec![
            Button {
                name: "First".into(),
                request: Some(ButtonRequest {
                    payload: Some(ButtonRequestPayload {
                        label: Some("the first option".into()),
                    }),
                }),
            },
            named_button("Second"),
            named_button("Third"),
            named_button("Fourth"),
        ];
        let d = dispatcher();
        d.dispatch(
            "1",
            &[Trace::Choice {
                payload: ChoicePayload {
                    message: None,
                    buttons,
                },
            }],
        )
        .await;
        let calls = d.sender().calls();
        let Sent::List { body, rows, .. } = &calls[0] else {
            panic!("expected list send");
        };
        assert_eq!(body, DEFAULT_CHOICE_PROMPT);
        assert_eq!(rows[0].description.as_deref(), Some("the first option"));
        assert_eq!(rows[1].description, None);
    }

    #[tokio::test]
    async fn long_button_titles_are_truncated() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[choice(None, &["This title is definitely too long"])],
        )
        .await;
        let calls = d.sender().calls();
        let Sent::Buttons { buttons, .. } = &calls[0] else {
            panic!("expected buttons send");
        };
        assert_eq!(buttons[0].title.chars().count(), BUTTON_TITLE_LIMIT);
    }

    #[tokio::test]
    async fn empty_choice_is_a_no_op() {
        let d = dispatcher();
        d.dispatch("1", &[choice(Some("Pick"), &[])]).await;
        assert!(d.sender().calls().is_empty());
    }

    #[tokio::test]
    async fn empty_carousel_is_a_no_op() {
        let d = dispatcher();
        d.dispatch("1", &[carousel(None, vec![])]).await;
        assert!(d.sender().calls().is_empty());
    }

    #[tokio::test]
    async fn single_card_with_image_sends_image_with_caption() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[carousel(
                None,
                vec![card(
                    Some("Basic"),
                    Some("Free forever"),
                    Some("https://example.com/basic.png"),
                )],
            )],
        )
        .await;
        assert_eq!(
            d.sender().calls(),
            vec![Sent::Image {
                url: "https://example.com/basic.png".into(),
                caption: Some("*Basic*\nFree forever".into()),
            }]
        );
    }

    #[tokio::test]
    async fn single_card_without_image_is_deterministic_text() {
        let d = dispatcher();
        let trace = carousel(None, vec![card(Some("Basic"), Some("Free forever"), None)]);
        d.dispatch("1", &[trace.clone()]).await;
        d.dispatch("1", &[trace]).await;
        let calls = d.sender().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0], Sent::Text("*Basic*\nFree forever".into()));
    }

    #[tokio::test]
    async fn two_cards_render_as_list_never_buttons() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[carousel(
                None,
                vec![
                    card(Some("Basic"), Some("Free forever"), None),
                    card(Some("Premium"), None, Some("https://example.com/p.png")),
                ],
            )],
        )
        .await;
        let calls = d.sender().calls();
        assert_eq!(calls.len(), 1);
        let Sent::List { header, action, rows, .. } = &calls[0] else {
            panic!("expected list send, got {calls:?}");
        };
        assert_eq!(header, LIST_HEADER);
        assert_eq!(action, CAROUSEL_ACTION);
        assert_eq!(
            rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["Basic", "Premium"]
        );
        assert!(rows[0].id.starts_with("card-0-"));
        assert!(rows[1].id.starts_with("card-1-"));
    }

    #[tokio::test]
    async fn carousel_title_goes_out_first_as_text() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[carousel(
                Some("Our plans"),
                vec![
                    card(Some("Basic"), None, None),
                    card(Some("Premium"), None, None),
                ],
            )],
        )
        .await;
        let calls = d.sender().calls();
        assert_eq!(calls[0], Sent::Text("Our plans".into()));
        assert!(matches!(calls[1], Sent::List { .. }));
    }

    #[tokio::test]
    async fn carousel_rows_are_capped_and_truncated() {
        let cards: Vec<Card> = (0..12)
            .map(|i| {
                let title = format!("A card title that runs far too long {i}");
                let description = "d".repeat(100);
                card(Some(title.as_str()), Some(description.as_str()), None)
            })
            .collect();
        let d = dispatcher();
        d.dispatch("1", &[carousel(None, cards)]).await;
        let calls = d.sender().calls();
        let Sent::List { rows, .. } = &calls[0] else {
            panic!("expected list send");
        };
        assert_eq!(rows.len(), LIST_ROW_LIMIT);
        assert!(rows.iter().all(|r| r.title.chars().count() <= LIST_ROW_TITLE_LIMIT));
        assert!(rows.iter().all(|r| {
            r.description
                .as_ref()
                .is_some_and(|d| d.chars().count() == LIST_ROW_DESCRIPTION_LIMIT)
        }));
    }

    #[tokio::test]
    async fn untitled_card_rows_get_positional_titles() {
        let d = dispatcher();
        d.dispatch(
            "1",
            &[carousel(None, vec![card(None, Some("one"), None), card(None, None, None)])],
        )
        .await;
        let calls = d.sender().calls();
        let Sent::List { rows, .. } = &calls[0] else {
            panic!("expected list send");
        };
        assert_eq!(rows[0].title, "Option 1");
        assert_eq!(rows[1].title, "Option 2");
    }
}
