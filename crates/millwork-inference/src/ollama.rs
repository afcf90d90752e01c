//! Ollama chat backend for dimension interpretation.
//!
//! Interpretation prompts ask for a single JSON object, so requests set
//! `format: "json"` and turn model reasoning off unless plain text is asked for.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use millwork_core::{defaults, Error, GenerationBackend, Result};

/// Answers slower than this are logged as slow.
const SLOW_ANSWER_MS: u64 = 30_000;

/// Where and how to reach Ollama.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub json_format: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            model: defaults::GEN_MODEL.to_string(),
            timeout: Duration::from_secs(defaults::GEN_TIMEOUT_SECS),
            json_format: true,
        }
    }
}

impl OllamaConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_GEN_MODEL` | `gpt-oss:20b` |
    /// | `MILLWORK_GEN_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("OLLAMA_BASE").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("OLLAMA_GEN_MODEL").filter(|v| !v.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(secs) = lookup("MILLWORK_GEN_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// [`GenerationBackend`] over Ollama's `/api/chat`.
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(mut config: OllamaConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            model = %config.model,
            timeout_secs = config.timeout.as_secs(),
            "Interpretation backend configured"
        );
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }

    pub fn with_config(base_url: String, model: String, timeout_secs: u64) -> Self {
        Self::new(OllamaConfig {
            base_url,
            model,
            timeout: Duration::from_secs(timeout_secs),
            ..Default::default()
        })
    }

    /// Ask for free text instead of a JSON object.
    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.config.json_format = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn chat_request<'a>(&'a self, system: &'a str, prompt: &'a str) -> ChatRequest<'a> {
        let system = (!system.is_empty()).then_some(ChatMessage {
            role: "system",
            content: system,
        });
        let user = ChatMessage {
            role: "user",
            content: prompt,
        };
        ChatRequest {
            model: &self.config.model,
            messages: system.into_iter().chain(Some(user)).collect(),
            stream: false,
            format: self.config.json_format.then_some("json"),
            think: self.config.json_format.then_some(false),
        }
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ExternalBoundary(format!(
                "Ollama did not answer within {}s",
                self.config.timeout.as_secs()
            ))
        } else {
            Error::ExternalBoundary(format!("Ollama request failed: {e}"))
        }
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(OllamaConfig::default())
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(self.config.timeout)
            .json(&self.chat_request(system, prompt))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalBoundary(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::ExternalBoundary(format!("Unreadable Ollama reply: {e}")))?;

        let elapsed = start.elapsed().as_millis() as u64;
        if elapsed > SLOW_ANSWER_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow interpretation answer");
        } else {
            debug!(
                duration_ms = elapsed,
                answer_len = reply.message.content.len(),
                "Answer received"
            );
        }
        Ok(reply.message.content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
