//! Test utilities for tally-core
//!
//! This module provides a mock Gemini server that speaks the
//! `generateContent` wire format, for development and integration tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// A canned reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with this text as the first candidate part
    Text(String),
    /// Non-2xx status with a plain body
    Status(u16, String),
    /// 200 with no candidates
    Empty,
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    default_text: String,
    requests: Vec<RecordedRequest>,
}

/// A request received by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path segment after `/v1beta/models/`, e.g. `gemini-2.5-flash:generateContent`
    pub model_action: String,
    /// The `key` query parameter
    pub api_key: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    /// Text of the first part
    pub fn prompt(&self) -> Option<&str> {
        self.body.pointer("/contents/0/parts/0/text")?.as_str()
    }

    /// Number of inline attachments
    pub fn attachment_count(&self) -> usize {
        self.body
            .pointer("/contents/0/parts")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().filter(|p| p.get("inline_data").is_some()).count())
            .unwrap_or(0)
    }
}

/// Mock Gemini server for testing and development
pub struct MockGeminiServer {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server on an available port
    ///
    /// Replies `[]` to every request until replies are queued.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockState {
            default_text: "[]".to_string(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/v1beta/models/:model_action", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Text returned once the queue is empty
    pub fn set_default_text(&self, text: impl Into<String>) {
        self.state.lock().unwrap().default_text = text.into();
    }

    /// Queue a reply for the next request
    pub fn push(&self, reply: MockReply) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    /// Queue a text reply for the next request
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(MockReply::Text(text.into()));
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// Gemini generateContent endpoint
async fn handle_generate(
    State(state): State<Arc<Mutex<MockState>>>,
    Path(model_action): Path<String>,
    Query(query): Query<KeyQuery>,
    Json(body): Json<Value>,
) -> Response {
    let reply = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            model_action,
            api_key: query.key,
            body,
        });
        state
            .replies
            .pop_front()
            .unwrap_or_else(|| MockReply::Text(state.default_text.clone()))
    };

    match reply {
        MockReply::Text(text) => Json(json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        }))
        .into_response(),
        MockReply::Status(code, body) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        MockReply::Empty => Json(json!({"candidates": []})).into_response(),
    }
}
