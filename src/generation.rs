//! Generative model providers.
//!
//! - **[`HuggingFaceGenerator`]**: Hugging Face Inference text-generation,
//!   `POST {url}/models/{model}`.
//! - **[`OpenAIGenerator`]**: OpenAI-compatible chat completions.
//! - **[`OllamaGenerator`]**: Ollama `POST /api/generate`.
//!
//! Each call is a single attempt bounded by `generation.timeout_secs`. Any
//! transport failure, timeout, non-2xx status, or unparsable body is a
//! [`RagError::Generation`].

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::RagError;

const DEFAULT_HF_URL: &str = "https://router.huggingface.co/hf-inference";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the model's completion for `prompt`, untrimmed.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

fn generation_err(msg: impl Into<String>) -> anyhow::Error {
    RagError::Generation(msg.into()).into()
}

struct Endpoint {
    client: reqwest::Client,
    timeout_secs: u64,
    token: Option<String>,
}

impl Endpoint {
    fn new(config: &GenerationConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
            token,
        })
    }

    async fn post(&self, url: &str, body: &serde_json::Value, label: &str) -> Result<serde_json::Value> {
        let mut req = self.client.post(url).json(body);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        debug!(url, "generation request");

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                generation_err(format!("{} timed out after {}s", label, self.timeout_secs))
            } else {
                generation_err(format!("{} request failed: {}", label, e))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                generation_err(format!("{} timed out after {}s", label, self.timeout_secs))
            } else {
                generation_err(format!("{} response could not be read: {}", label, e))
            }
        })?;
        if !status.is_success() {
            return Err(generation_err(format!("{} API error {}: {}", label, status, text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| generation_err(format!("{} returned invalid JSON: {}", label, e)))
    }
}

fn read_token(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|t| !t.trim().is_empty())
}

// ============ Hugging Face ============

pub struct HuggingFaceGenerator {
    model: String,
    url: String,
    max_new_tokens: u32,
    temperature: Option<f32>,
    endpoint: Endpoint,
}

impl HuggingFaceGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or("HF_TOKEN");
        let token = read_token(key_env);
        if token.is_none() {
            warn!("{} is not set; calling the inference endpoint without a token", key_env);
        }
        Ok(Self {
            model: config.model.clone(),
            url: config.url.clone().unwrap_or_else(|| DEFAULT_HF_URL.to_string()),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            endpoint: Endpoint::new(config, token)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for HuggingFaceGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut parameters = serde_json::json!({
            "max_new_tokens": self.max_new_tokens,
            "return_full_text": false,
        });
        if let Some(t) = self.temperature {
            parameters["temperature"] = serde_json::json!(t);
        }
        let body = serde_json::json!({ "inputs": prompt, "parameters": parameters });
        let url = format!("{}/models/{}", self.url.trim_end_matches('/'), self.model);

        let json = self.endpoint.post(&url, &body, "Hugging Face").await?;
        parse_hf_generation(&json)
    }
}

/// Accepts `[{"generated_text": ..}]` or `{"generated_text": ..}`; an
/// `{"error": ..}` body is reported as is.
fn parse_hf_generation(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error") {
        let msg = err.as_str().map_or_else(|| err.to_string(), str::to_string);
        return Err(generation_err(format!("Hugging Face error: {}", msg)));
    }
    let item = match json.as_array() {
        Some(items) => items.first(),
        None => Some(json),
    };
    item.and_then(|i| i.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| generation_err("Invalid Hugging Face response: missing generated_text"))
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    url: String,
    max_new_tokens: u32,
    temperature: Option<f32>,
    endpoint: Endpoint,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let token = read_token(key_env)
            .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", key_env))?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.clone().unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            endpoint: Endpoint::new(config, Some(token))?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_new_tokens,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        let url = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let json = self.endpoint.post(&url, &body, "OpenAI").await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| generation_err("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    max_new_tokens: u32,
    temperature: Option<f32>,
    endpoint: Endpoint,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config.url.clone().unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            endpoint: Endpoint::new(config, None)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut options = serde_json::json!({ "num_predict": self.max_new_tokens });
        if let Some(t) = self.temperature {
            options["temperature"] = serde_json::json!(t);
        }
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = self.endpoint.post(&url, &body, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| generation_err("Invalid Ollama response: missing response"))
    }
}

/// Create the [`GenerationProvider`] named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "huggingface" => Ok(Box::new(HuggingFaceGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}
