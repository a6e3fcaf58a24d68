//! Client for the dialogue backend's per-user interact endpoint.
//!
//! The backend owns all conversational state, keyed by the sender identity;
//! this client is stateless per call. Failures are absorbed here: after the
//! retry budget is spent the caller receives a fixed fallback trace sequence,
//! never an error.

use std::time::Duration;

use relay_core::{RetryPolicy, TextPayload, Trace, retry_with_backoff, trace_from_value};
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(1_500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Static reply delivered when the backend stays unreachable.
pub const FALLBACK_GREETING: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";

/// All variants are retryable: transport failures, non-2xx statuses, and
/// responses that are not an array of traces.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("dialogue transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("dialogue backend returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("dialogue backend returned a non-array response")]
    MalformedResponse,
}

#[derive(Clone)]
pub struct DialogueClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    retry: RetryPolicy,
}

impl DialogueClient {
    pub fn new(http: reqwest::Client, api_base: &str, api_key: &str) -> Self {
        Self::with_retry(http, api_base, api_key, RetryPolicy::new(MAX_ATTEMPTS, BASE_DELAY))
    }

    pub fn with_retry(
        http: reqwest::Client,
        api_base: &str,
        api_key: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry,
        }
    }

    fn interact_url(&self, user_id: &str) -> String {
        format!("{}/state/user/{}/interact", self.api_base, user_id)
    }

    /// Sends one utterance for `user_id` and returns the ordered traces.
    ///
    /// Never fails: retry exhaustion degrades to [`fallback_traces`].
    pub async fn interact(&self, user_id: &str, utterance: &str) -> Vec<Trace> {
        let result = retry_with_backoff(self.retry, |_| self.try_interact(user_id, utterance)).await;
        match result {
            Ok(traces) => traces,
            Err(err) => {
                tracing::error!(
                    user = %user_id,
                    error = %err,
                    "dialogue backend unavailable, serving fallback reply"
                );
                fallback_traces()
            }
        }
    }

    async fn try_interact(
        &self,
        user_id: &str,
        utterance: &str,
    ) -> Result<Vec<Trace>, DialogueError> {
        let response = self
            .http
            .post(self.interact_url(user_id))
            .header("Authorization", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&interact_body(utterance))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialogueError::Status { status, body });
        }

        let value: Value = response.json().await?;
        let Some(items) = value.as_array() else {
            return Err(DialogueError::MalformedResponse);
        };
        Ok(items.iter().map(trace_from_value).collect())
    }
}

/// Request body for one dialogue turn. Speech synthesis is disabled, markup
/// is stripped, any previously queued response is cancelled, and internal
/// trace kinds are excluded. This shape is a wire contract; keep it stable.
fn interact_body(utterance: &str) -> Value {
    json!({
        "action": {
            "type": "text",
            "payload": utterance,
        },
        "config": {
            "tts": false,
            "stripSSML": true,
            "stopAll": true,
            "excludeTypes": ["block", "debug", "flow"],
        }
    })
}

/// Terminal fallback: a single text trace with a static greeting.
pub fn fallback_traces() -> Vec<Trace> {
    vec![Trace::Text {
        payload: TextPayload {
            message: FALLBACK_GREETING.to_string(),
        },
    }]
}
