//! Language model clients used to condense questions and synthesize answers.
//!
//! Both adapters issue plain HTTP requests through `reqwest` and return the first text
//! completion. Streaming is not supported.

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider was misconfigured or unreachable.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError>;
}

/// Build the language model selected by configuration.
pub fn language_model_from_config(
    config: &Config,
) -> Result<Box<dyn LanguageModel>, LanguageModelError> {
    tracing::debug!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        "Selecting language model"
    );
    match config.llm_provider {
        LlmProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Box::new(OllamaLanguageModel::new(
                base_url,
                config.llm_model.clone(),
            )?))
        }
        LlmProvider::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                LanguageModelError::ProviderUnavailable("GEMINI_API_KEY is not set".into())
            })?;
            let base_url = config
                .gemini_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string());
            Ok(Box::new(GeminiLanguageModel::new(
                base_url,
                config.llm_model.clone(),
                api_key,
            )?))
        }
    }
}

fn build_http_client() -> Result<Client, LanguageModelError> {
    Client::builder()
        .user_agent("docqa/llm")
        .build()
        .map_err(|error| LanguageModelError::ProviderUnavailable(error.to_string()))
}

/// Completion client for a local Ollama runtime.
pub struct OllamaLanguageModel {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaLanguageModel {
    /// Construct a client targeting `base_url` with the given model.
    pub fn new(base_url: String, model: String) -> Result<Self, LanguageModelError> {
        Ok(Self {
            http: build_http_client()?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LanguageModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Completion client for the Gemini `generateContent` API.
pub struct GeminiLanguageModel {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiLanguageModel {
    /// Construct a client targeting `base_url` with the given model and API key.
    pub fn new(base_url: String, model: String, api_key: String) -> Result<Self, LanguageModelError> {
        Ok(Self {
            http: build_http_client()?,
            base_url,
            model,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[async_trait]
impl LanguageModel for GeminiLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let payload = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": prompt }] }
            ],
            "generationConfig": { "temperature": 0.1 }
        });

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: GeminiResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!(
                "failed to decode Gemini response: {error}"
            ))
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .ok_or_else(|| {
                LanguageModelError::InvalidResponse("Gemini returned no candidates".into())
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(LanguageModelError::InvalidResponse(
                "Gemini candidate contained no text".into(),
            ));
        }
        Ok(text.to_string())
    }
}
