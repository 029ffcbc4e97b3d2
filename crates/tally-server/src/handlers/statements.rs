//! Statement handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use tally_core::ai::ExtractedTransaction;
use tally_core::models::{Statement, StatementStatus, Transaction};
use tally_core::pipeline::{to_new_transactions, StatementProcessor};
use tally_core::storage::{extension_for_mime, FileStore};
use tally_core::SaveResult;

use super::{owned_statement, read_json};
use crate::{AppError, AppState, Caller, SuccessResponse, MAX_JSON_BODY, MAX_UPLOAD_SIZE};

/// Filename assumed when an upload names none
const DEFAULT_UPLOAD_NAME: &str = "statement.pdf";

#[derive(Debug, Deserialize)]
pub struct CreateStatementRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: StatementStatus,
    /// Failure reason, published with the status event
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

/// GET /api/statements - List the caller's statements, newest first
pub async fn list_statements(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Statement>>, AppError> {
    let user = caller.require_user()?;
    Ok(Json(state.db.list_statements(user)?))
}

/// POST /api/statements - Create a statement in draft status
pub async fn create_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Result<Json<Statement>, AppError> {
    let user = caller.require_user()?.to_string();
    let req: CreateStatementRequest = read_json(request.into_body(), 1024 * 4).await?;

    let statement = state
        .db
        .create_statement(&user, &req.name)
        .map_err(AppError::from_core)?;
    Ok(Json(statement))
}

/// GET /api/statements/:id - Get a statement
pub async fn get_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<Statement>, AppError> {
    let user = caller.require_user()?;
    Ok(Json(owned_statement(&state, user, id)?))
}

/// PATCH /api/statements/:id/status - Move a statement through its lifecycle
pub async fn update_statement_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Statement>, AppError> {
    let user = caller.require_user()?.to_string();
    owned_statement(&state, &user, id)?;
    let req: UpdateStatusRequest = read_json(request.into_body(), 1024 * 4).await?;

    let statement = state
        .db
        .transition_statement(id, req.status, req.error.as_deref())
        .map_err(AppError::from_core)?;
    Ok(Json(statement))
}

/// DELETE /api/statements/:id - Delete a statement, its transactions, and its file
pub async fn delete_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = caller.require_user()?;
    owned_statement(&state, user, id)?;

    let file = state.db.delete_statement(id).map_err(AppError::from_core)?;
    if let Some(key) = file {
        if let Err(e) = state.store.delete(&key) {
            warn!(statement_id = id, error = %e, "Failed to remove statement file");
        }
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/statements/:id/file?filename=... - Upload the statement file and start extraction
///
/// The body is the raw file; its `Content-Type` decides the document type
/// when the filename has no known extension. The statement moves to
/// `processing` and extraction runs in the background; follow it with the
/// events stream.
pub async fn upload_statement_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Query(query): Query<UploadQuery>,
    request: Request,
) -> Result<Json<Statement>, AppError> {
    let user = caller.require_user()?.to_string();
    let statement = owned_statement(&state, &user, id)?;

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| extension_for_mime(ct).is_some())
        .map(str::to_string);

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::payload_too_large("File too large (max 10 MB)"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("File is empty"));
    }

    let processor = state.processor()?;
    processor.begin(id).map_err(AppError::from_core)?;

    // Uploads naming neither a file nor a known type are taken as PDFs
    let filename = query
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(if content_type.is_some() { "" } else { DEFAULT_UPLOAD_NAME });
    let key = FileStore::statement_key(id, filename, content_type.as_deref(), Utc::now());

    let stored = state
        .store
        .put(&key, &bytes)
        .and_then(|_| state.db.set_statement_file(id, &key));
    if let Err(e) = stored {
        warn!(statement_id = id, error = %e, "Failed to store statement file");
        let reason = "Failed to upload statement file";
        if let Err(mark_err) =
            state
                .db
                .transition_statement(id, StatementStatus::Failed, Some(reason))
        {
            warn!(statement_id = id, error = %mark_err, "Could not mark statement failed");
        }
        return Err(AppError::internal(reason));
    }

    // The previous upload is no longer referenced
    if let Some(old) = statement.bank_statement_url.filter(|old| *old != key) {
        if let Err(e) = state.store.delete(&old) {
            warn!(statement_id = id, error = %e, "Failed to remove previous statement file");
        }
    }

    info!(statement_id = id, size = bytes.len(), "Statement file uploaded");
    spawn_extraction(processor, id);

    let statement = owned_statement(&state, &user, id)?;
    Ok(Json(statement))
}

/// POST /api/statements/:id/process - Re-run extraction on the stored file
pub async fn process_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<Statement>, AppError> {
    let user = caller.require_user()?;
    let statement = owned_statement(&state, user, id)?;
    if statement.bank_statement_url.is_none() {
        return Err(AppError::bad_request("No bank statement file found"));
    }

    let processor = state.processor()?;
    let statement = processor.begin(id).map_err(AppError::from_core)?;
    spawn_extraction(processor, id);

    Ok(Json(statement))
}

/// Run extraction in the background; the outcome lands in the statement status
fn spawn_extraction(processor: StatementProcessor, statement_id: i64) {
    tokio::spawn(async move {
        // Failures are logged and recorded by the processor
        let _ = processor.run(statement_id).await;
    });
}

/// GET /api/statements/:id/transactions - Transactions of a statement, by date
pub async fn list_statement_transactions(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = caller.require_user()?;
    owned_statement(&state, user, id)?;
    Ok(Json(state.db.list_statement_transactions(id)?))
}

/// POST /api/statements/:id/transactions - Save extracted rows for a statement
///
/// Rows already stored for the user (same fingerprint) are skipped.
pub async fn save_statement_transactions(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SaveResult>, AppError> {
    let user = caller.require_user()?.to_string();
    let statement = owned_statement(&state, &user, id)?;
    let extracted: Vec<ExtractedTransaction> = read_json(request.into_body(), MAX_JSON_BODY).await?;

    let rows = to_new_transactions(&statement, &extracted).map_err(AppError::from_core)?;
    let saved = state.db.save_transactions(&rows).map_err(AppError::from_core)?;
    Ok(Json(saved))
}
