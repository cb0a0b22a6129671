//! Answer synthesis backends.
//!
//! - **[`DisabledSynthesizer`]**: returns errors; used when no model is configured.
//! - **[`OllamaSynthesizer`]**: `POST /api/generate` on a local Ollama instance.
//! - **[`OpenAISynthesizer`]**: OpenAI-compatible `POST /v1/chat/completions`,
//!   sending the prompt as a single user message.
//!
//! All backends are non-streaming and return the model's text verbatim.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;

use docqa_core::synthesis::Synthesizer;
use docqa_core::{RagError, Result};

use crate::config::SynthesisConfig;
use crate::service::HttpService;

const SERVICE: &str = "synthesis";

pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Service {
            service: SERVICE.to_string(),
            message: "synthesis is disabled; set [synthesis].provider in the config".into(),
        })
    }
}

pub struct OllamaSynthesizer {
    model: String,
    url: String,
    temperature: f32,
    http: HttpService,
}

impl OllamaSynthesizer {
    pub fn new(config: &SynthesisConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("synthesis.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            http: HttpService::new(SERVICE, config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl Synthesizer for OllamaSynthesizer {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = self
            .http
            .post_json(&format!("{}/api/generate", self.url), None, &body)
            .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(String::from)
        .ok_or_else(|| invalid("Ollama response missing 'response'"))
}

pub struct OpenAISynthesizer {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    http: HttpService,
}

impl OpenAISynthesizer {
    pub fn new(config: &SynthesisConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("synthesis.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            http: HttpService::new(SERVICE, config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAISynthesizer {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        let json = self
            .http
            .post_json(
                &format!("{}/v1/chat/completions", self.url),
                Some(&self.api_key),
                &body,
            )
            .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| invalid("no choices in response"))?;
    choice["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| invalid("choice has no message content"))
}

fn invalid(message: &str) -> RagError {
    RagError::Service {
        service: SERVICE.to_string(),
        message: format!("invalid response: {}", message),
    }
}

/// Create the [`Synthesizer`] selected by `[synthesis].provider`.
pub fn create_synthesizer(config: &SynthesisConfig) -> anyhow::Result<Arc<dyn Synthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSynthesizer)),
        "ollama" => Ok(Arc::new(OllamaSynthesizer::new(config)?)),
        "openai" => Ok(Arc::new(OpenAISynthesizer::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}
