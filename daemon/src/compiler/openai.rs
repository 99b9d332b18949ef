use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::{CodeGenerator, CompileError};
use crate::config::CompilerConfig;

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    system_prompt: String,
    /// Overrides the environment variable when set.
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Build a client from config. The API key is read from the environment
    /// variable the config names on every request, so a key exported after
    /// startup is picked up; a missing key is reported per request.
    pub fn new(config: &CompilerConfig, timeout_secs: u64) -> Result<Self, CompileError> {
        if read_key(&config.api_key_env).is_none() {
            tracing::warn!(
                "{} is not set; spoken and typed commands will fail until it is",
                config.api_key_env
            );
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            api_key: None,
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    async fn request(&self, api_key: &str, prompt: &str) -> Result<String, CompileError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CompileError::Status {
                code: status.as_u16(),
                body: truncate(&text, 240),
            });
        }

        parse_completion(&text)
    }
}

impl CodeGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, CompileError> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| read_key(&self.api_key_env))
            .ok_or_else(|| CompileError::MissingCredential(self.api_key_env.clone()))?;

        debug!("Sending prompt to {} ({})", self.endpoint, self.model);
        let content = timeout(self.timeout, self.request(&api_key, prompt))
            .await
            .map_err(|_| CompileError::Timeout(self.timeout.as_secs()))??;

        debug!("Model replied with {} bytes", content.len());
        Ok(content)
    }
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.trim().is_empty())
}

/// Content of the first choice in a chat-completions response body.
fn parse_completion(body: &str) -> Result<String, CompileError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(CompileError::EmptyResponse)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
