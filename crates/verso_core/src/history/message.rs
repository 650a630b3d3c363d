//! Commit messages for checkpoints.
//!
//! [`CommitMessageGenerator`] walks an ordered list of providers and returns
//! the first message any of them produces. When every provider fails (or none
//! is configured) callers fall back to [`fallback_message`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiProviderConfig;
use crate::error::{Result, VersoError};

/// Diffs longer than this are cut before being sent to a provider.
const MAX_DIFF_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You write git commit messages for a personal note-taking app. \
Reply with a single short line (at most 72 characters) in the imperative mood describing \
the change to the notes. No quotes, no prefixes, no trailing period.";

/// A single source of commit messages.
#[async_trait]
pub trait CommitMessageProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce a message for a staged diff.
    async fn try_generate(&self, diff: &str) -> Result<String>;
}

/// Ordered fallback chain of providers.
#[derive(Clone, Default)]
pub struct CommitMessageGenerator {
    providers: Vec<Arc<dyn CommitMessageProvider>>,
}

impl CommitMessageGenerator {
    pub fn new(providers: Vec<Arc<dyn CommitMessageProvider>>) -> Self {
        Self { providers }
    }

    /// Build one OpenAI-compatible provider per configured entry.
    pub fn from_config(configs: &[AiProviderConfig]) -> Self {
        let providers = configs
            .iter()
            .map(|c| Arc::new(OpenAiCompatibleProvider::from_config(c)) as Arc<dyn CommitMessageProvider>)
            .collect();
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// First successful, non-empty message, or `None` once every provider failed.
    pub async fn generate(&self, diff: &str) -> Option<String> {
        if diff.trim().is_empty() {
            return None;
        }
        for provider in &self.providers {
            match provider.try_generate(diff).await {
                Ok(message) => match clean_message(&message) {
                    Some(message) => {
                        debug!("Commit message from {}", provider.name());
                        return Some(message);
                    }
                    None => warn!("{} returned an empty commit message", provider.name()),
                },
                Err(e) => warn!("Commit message provider {} failed: {}", provider.name(), e),
            }
        }
        None
    }

    /// Like [`generate`](Self::generate), falling back to the timestamped template.
    pub async fn generate_or_fallback(&self, diff: &str, now: DateTime<Local>) -> String {
        match self.generate(diff).await {
            Some(message) => message,
            None => fallback_message(now),
        }
    }
}

/// Deterministic checkpoint message.
pub fn fallback_message(now: DateTime<Local>) -> String {
    format!("Checkpoint {}", now.format("%Y-%m-%d %H:%M"))
}

/// Keep the first non-empty line, stripped of surrounding quotes.
fn clean_message(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '`' || c == '\'').trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

fn truncate_diff(diff: &str) -> &str {
    match diff.char_indices().nth(MAX_DIFF_CHARS) {
        Some((idx, _)) => &diff[..idx],
        None => diff,
    }
}

/// Provider speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client,
        }
    }

    pub fn from_config(config: &AiProviderConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());
        Self::new(&config.name, &config.base_url, &config.model, api_key)
    }
}

#[async_trait]
impl CommitMessageProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_generate(&self, diff: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: truncate_diff(diff),
                },
            ],
            max_tokens: 60,
            temperature: 0.2,
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VersoError::Generator(format!("{}: {}", self.model, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VersoError::Generator(format!(
                "{} returned HTTP {}",
                self.model,
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VersoError::Generator(format!("{}: {}", self.model, e)))?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| VersoError::Generator(format!("{} returned no choices", self.model)))
    }
}
