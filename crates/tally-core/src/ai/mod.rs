//! Pluggable LLM backend abstraction
//!
//! # Architecture
//!
//! - `AIBackend` trait: text generation over a prompt plus inline documents
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//! - `parsing`: pulls JSON arrays/objects out of free-text model output
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (gemini, mock). Default: gemini
//! - `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_HOST`: see `GeminiBackend`

pub mod gemini;
mod mock;
pub mod parsing;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all LLM backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send a prompt with attachments and return the raw provider response
    async fn generate_raw(
        &self,
        prompt: &str,
        documents: &[InlineDocument],
    ) -> Result<serde_json::Value>;

    /// Send a prompt with attachments and return the model's text
    ///
    /// A response without text is an error.
    async fn generate(&self, prompt: &str, documents: &[InlineDocument]) -> Result<String>;

    /// Model name used for requests
    fn model(&self) -> &str;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Concrete AI client that wraps any backend
#[derive(Clone)]
pub enum AIClient {
    Gemini(GeminiBackend),
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `gemini` (default): Uses GEMINI_API_KEY, GEMINI_MODEL, GEMINI_HOST
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" => GeminiBackend::from_env().map(AIClient::Gemini),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(AIClient::Gemini)
            }
        }
    }

    /// Create a Gemini backend directly
    pub fn gemini(host: &str, api_key: &str) -> Self {
        AIClient::Gemini(GeminiBackend::new(host, api_key))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn generate_raw(
        &self,
        prompt: &str,
        documents: &[InlineDocument],
    ) -> Result<serde_json::Value> {
        match self {
            AIClient::Gemini(b) => b.generate_raw(prompt, documents).await,
            AIClient::Mock(b) => b.generate_raw(prompt, documents).await,
        }
    }

    async fn generate(&self, prompt: &str, documents: &[InlineDocument]) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.generate(prompt, documents).await,
            AIClient::Mock(b) => b.generate(prompt, documents).await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            AIClient::Gemini(b) => b.backend_name(),
            AIClient::Mock(b) => b.backend_name(),
        }
    }
}
