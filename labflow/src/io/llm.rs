//! Text generation client for an OpenAI-compatible chat completions API.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::types::Message;
use crate::io::config::LlmConfig;

/// Abstraction over text generation backends shared by the planner, the path
/// extractor, and every specialist.
pub trait TextGenerator {
    /// Complete a conversation and return the assistant's reply text.
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Blocking client for `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        if api_key.trim().is_empty() {
            bail!("${} is empty", config.api_key_env);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }
}

impl TextGenerator for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", self.url))?;

        let status = response.status();
        let text = response.text().context("read completion body")?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "completion request failed");
            bail!("completion request failed with {status}: {text}");
        }

        let reply = parse_completion(&text)?;
        debug!(reply_bytes = reply.len(), "completion received");
        Ok(reply)
    }
}

/// Extract the first choice's content from a chat completions response body.
pub fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).context("parse completion json")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no choices in completion"))?;
    choice
        .message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("empty completion content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_completion_reads_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"/data/raw"}},{"index":1,"message":{"role":"assistant","content":"other"}}]}"#;
        assert_eq!(parse_completion(body).expect("parse"), "/data/raw");
    }

    #[test]
    fn parse_completion_rejects_empty_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let err = parse_completion(body).expect_err("empty");
        assert!(err.to_string().contains("empty completion"));
    }

    #[test]
    fn parse_completion_rejects_missing_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).expect_err("no choices");
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn request_body_uses_wire_role_names() {
        let messages = [Message::system("sys"), Message::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).expect("json");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["temperature"], 0.5);
    }
}
