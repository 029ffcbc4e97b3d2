//! Mock backend for testing
//!
//! Replies with queued responses in order, then with a fixed default.
//! Useful for unit tests and development without an API key.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::InlineDocument;
use super::AIBackend;

/// A scripted reply
#[derive(Clone, Debug)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    queue: Arc<Mutex<VecDeque<Reply>>>,
    default_text: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock that answers every prompt with an empty JSON array
    pub fn new() -> Self {
        Self::with_default("[]")
    }

    /// Create a mock that answers every prompt with `text`
    pub fn with_default(text: &str) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            default_text: text.to_string(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a reply for the next call
    pub fn push_response(&self, text: &str) -> &Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Reply::Text(text.to_string()));
        }
        self
    }

    /// Queue a failure for the next call
    pub fn push_error(&self, message: &str) -> &Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Reply::Fail(message.to_string()));
        }
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self, prompt: &str) -> Reply {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Reply::Text(self.default_text.clone()))
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn generate_raw(
        &self,
        prompt: &str,
        _documents: &[InlineDocument],
    ) -> Result<serde_json::Value> {
        match self.next_reply(prompt) {
            Reply::Text(text) => Ok(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
            })),
            Reply::Fail(message) => Err(Error::Llm(message)),
        }
    }

    async fn generate(&self, prompt: &str, _documents: &[InlineDocument]) -> Result<String> {
        match self.next_reply(prompt) {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(Error::Llm(message)),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let mock = MockBackend::with_default("fallback");
        mock.push_response("first").push_error("boom");

        assert_eq!(mock.generate("a", &[]).await.unwrap(), "first");
        assert!(mock.generate("b", &[]).await.is_err());
        assert_eq!(mock.generate("c", &[]).await.unwrap(), "fallback");
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_raw_wraps_text_like_gemini() {
        let mock = MockBackend::with_default("[]");
        let raw = mock.generate_raw("p", &[]).await.unwrap();
        assert_eq!(super::super::gemini::response_text(&raw).as_deref(), Some("[]"));
    }
}
