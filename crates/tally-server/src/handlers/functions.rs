//! Function endpoints: LLM proxy, receipt ingestion, synchronous processing
//!
//! These serve callers outside the web UI (prompt tester, receipt scanners,
//! scripts) and keep the request and response shapes those callers expect.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::ai::{AIBackend, InlineDocument};
use tally_core::ingest::{IngestReport, ReceiptIngestor, ReceiptPayload};
use tally_core::pipeline::failure_message;

use super::enrichment::strip_data_url;
use super::{owned_statement, read_json};
use crate::{AppError, AppState, Caller, MAX_JSON_BODY, MAX_UPLOAD_SIZE};

#[derive(Debug, Deserialize)]
pub struct ProxyImage {
    pub data: Option<String>,
    #[serde(alias = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProxyRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    pub images: Vec<ProxyImage>,
}

impl LlmProxyRequest {
    fn documents(&self) -> Result<Vec<InlineDocument>, AppError> {
        self.images
            .iter()
            .map(|image| {
                let data = image.data.as_deref().filter(|d| !d.trim().is_empty());
                let mime_type = image.mime_type.as_deref().filter(|m| !m.trim().is_empty());
                match (data, mime_type) {
                    (Some(data), Some(mime_type)) => Ok(InlineDocument {
                        mime_type: mime_type.to_string(),
                        data: strip_data_url(data).to_string(),
                    }),
                    _ => Err(AppError::bad_request("Each image needs data and mimeType")),
                }
            })
            .collect()
    }
}

/// POST /api/functions/llm-proxy - Send a prompt (and images) to the model
///
/// Returns the provider's response JSON unchanged.
pub async fn llm_proxy(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<serde_json::Value>, AppError> {
    let ai = state.ai_client()?;

    let req: LlmProxyRequest = read_json(request.into_body(), MAX_UPLOAD_SIZE * 2).await?;
    let prompt = req
        .prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Prompt is required"))?;
    let documents = req.documents()?;

    info!(
        backend = ai.backend_name(),
        attachments = documents.len(),
        "LLM proxy request"
    );
    let response = ai
        .generate_raw(prompt, &documents)
        .await
        .map_err(|e| AppError::internal(&failure_message(&e)))?;
    Ok(Json(response))
}

/// POST /api/functions/ingest-receipt - Store receipts and reconcile them
///
/// Accepts `{receipts: [...]}`, a bare array, or a single receipt. A caller
/// without a user must put `user_id` on every receipt.
pub async fn ingest_receipt(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Result<Json<IngestReport>, AppError> {
    let payload: ReceiptPayload = read_json(request.into_body(), MAX_JSON_BODY).await?;

    let report = ReceiptIngestor::new(state.db.clone()).ingest(payload, caller.user.as_deref());
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ProcessStatementRequest {
    pub statement_id: Option<i64>,
}

#[derive(Serialize)]
pub struct ProcessStatementResponse {
    pub success: bool,
    pub count: usize,
}

/// POST /api/functions/process-statement - Run extraction and wait for it
///
/// The statement is moved to `processing` first, so one already being
/// processed by an upload's background job is refused with 409.
pub async fn run_process_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Result<Json<ProcessStatementResponse>, AppError> {
    let req: ProcessStatementRequest = read_json(request.into_body(), 1024).await?;
    let id = req
        .statement_id
        .ok_or_else(|| AppError::bad_request("statement_id is required"))?;

    let statement = match caller.user.as_deref() {
        Some(user) => owned_statement(&state, user, id)?,
        None => state
            .db
            .get_statement(id)?
            .ok_or_else(|| AppError::not_found("Statement not found"))?,
    };

    let processor = state.processor()?;
    processor.begin(id).map_err(AppError::from_core)?;
    info!(statement_id = id, from = %statement.status, "Processing statement synchronously");

    let count = processor
        .run(id)
        .await
        .map_err(|e| AppError::internal(&failure_message(&e)))?;
    Ok(Json(ProcessStatementResponse {
        success: true,
        count,
    }))
}
