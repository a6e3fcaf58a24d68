//! End-to-end relay of one inbound message.
//!
//! Steps within one message are strictly sequential (normalize → interact →
//! dispatch); distinct messages run in their own detached tasks with no
//! ordering guarantee between them. `handle` never fails: every failure mode
//! is absorbed by the dialogue client or the dispatcher.

use relay_core::{InboundEvent, Normalized, WebhookMessage, normalize};

use crate::dialogue::DialogueClient;
use crate::dispatch::Dispatcher;
use crate::sender::OutboundSender;

pub struct Relay<S> {
    dialogue: DialogueClient,
    dispatcher: Dispatcher<S>,
}

impl<S: OutboundSender> Relay<S> {
    pub fn new(dialogue: DialogueClient, dispatcher: Dispatcher<S>) -> Self {
        Self {
            dialogue,
            dispatcher,
        }
    }

    pub async fn handle(&self, message: WebhookMessage) {
        let message_id = message.id.clone();
        let event = InboundEvent::from(message);
        let from = event.from.clone();

        match normalize(&event) {
            Normalized::Utterance(utterance) => {
                if let Some(id) = message_id.as_deref() {
                    self.dispatcher.sender().mark_processing(id).await;
                }
                let traces = self.dialogue.interact(&from, &utterance).await;
                tracing::info!(user = %from, traces = traces.len(), "dispatching dialogue turn");
                self.dispatcher.dispatch(&from, &traces).await;
            }
            Normalized::Empty => {
                tracing::info!(user = %from, "empty utterance, skipping");
            }
            Normalized::Unsupported => {
                tracing::info!(user = %from, "unsupported message kind, skipping");
            }
        }
    }
}
