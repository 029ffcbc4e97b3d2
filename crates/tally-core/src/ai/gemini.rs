//! Gemini backend implementation
//!
//! Calls the `generateContent` endpoint with a text part followed by one
//! `inline_data` part per attached document.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY`: API key (required)
//! - `GEMINI_MODEL`: Model name (default: gemini-2.5-flash)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::types::InlineDocument;
use super::AIBackend;

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Statement PDFs take a while to read; keep well above typical latency
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

fn request_body<'a>(prompt: &'a str, documents: &'a [InlineDocument]) -> GenerateContentRequest<'a> {
    let mut parts = vec![Part::Text { text: prompt }];
    parts.extend(documents.iter().map(|doc| Part::InlineData {
        inline_data: InlineData {
            mime_type: &doc.mime_type,
            data: &doc.data,
        },
    }));
    GenerateContentRequest {
        contents: vec![Content { parts }],
    }
}

/// Text of the first candidate's first part, if any
pub fn response_text(response: &serde_json::Value) -> Option<String> {
    response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

/// Google Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    /// Create a new Gemini backend against `base_url`
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Returns None if `GEMINI_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let host = std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_GEMINI_HOST.to_string());
        let backend = Self::new(&host, &api_key);
        Some(match std::env::var("GEMINI_MODEL") {
            Ok(model) if !model.trim().is_empty() => backend.with_model(model.trim()),
            _ => backend,
        })
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl AIBackend for GeminiBackend {
    async fn generate_raw(
        &self,
        prompt: &str,
        documents: &[InlineDocument],
    ) -> Result<serde_json::Value> {
        debug!(
            model = %self.model,
            documents = documents.len(),
            prompt_len = prompt.len(),
            "Calling Gemini generateContent"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(prompt, documents))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Gemini request failed");
            return Err(Error::Llm(format!("Gemini API error {}: {}", status, body)));
        }

        Ok(response.json().await?)
    }

    async fn generate(&self, prompt: &str, documents: &[InlineDocument]) -> Result<String> {
        let raw = self.generate_raw(prompt, documents).await?;
        response_text(&raw).ok_or_else(|| Error::Llm("No response from Gemini API".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }
}
