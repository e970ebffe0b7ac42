//! OpenAI-compatible chat completion classifier.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ALLOWED_LABELS, SUSPECT};
use crate::{Result, WaymarkError};

/// Default chat completion API base.
pub const DEFAULT_CLASSIFIER_URL: &str = "https://api.openai.com/v1";

/// Default model name.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a website content classifier. Reply with a single lowercase category name and nothing else.";

/// Remote text classifier with a closed label vocabulary.
///
/// The credential is held by the value itself and never logged.
#[derive(Clone)]
pub struct RemoteClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl fmt::Debug for RemoteClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClassifier")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteClassifier {
    /// Creates a classifier against the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_CLASSIFIER_URL.to_string(),
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sends requests through `client`, sharing its connection pool.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Asks the service for a label. The reply is always coerced into [`ALLOWED_LABELS`].
    pub async fn classify(&self, domain: &str, title: &str, description: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: build_prompt(domain, title, description) },
            ],
            temperature: 0.0,
            max_tokens: 8,
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| WaymarkError::Classifier(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(WaymarkError::Classifier(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| WaymarkError::Classifier(format!("unreadable reply: {}", e)))?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| WaymarkError::Classifier("empty reply".to_string()))?;

        Ok(coerce_label(&text).to_string())
    }
}

/// The fixed prompt sent for one page.
pub fn build_prompt(domain: &str, title: &str, description: &str) -> String {
    format!(
        "Classify the website below into exactly one of these categories: {}.\n\
         Use \"clean\" for ordinary sites. Answer with the category name only.\n\n\
         Domain: {}\nTitle: {}\nDescription: {}",
        ALLOWED_LABELS.join(", "),
        domain,
        title,
        description
    )
}

/// Maps free text onto the allow-list; anything unrecognized becomes [`SUSPECT`].
pub fn coerce_label(reply: &str) -> &'static str {
    let normalized = reply
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase();

    ALLOWED_LABELS
        .iter()
        .copied()
        .find(|label| *label == normalized)
        .unwrap_or(SUSPECT)
}
