//! Draft handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::read_json;
use crate::{AppError, AppState, Caller, SuccessResponse, MAX_JSON_BODY};

const MAX_DRAFT_KEY: usize = 100;

#[derive(Serialize)]
pub struct DraftResponse {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutDraftRequest {
    pub value: String,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    if key.trim().is_empty() || key.len() > MAX_DRAFT_KEY {
        return Err(AppError::bad_request("Invalid draft key"));
    }
    Ok(())
}

/// GET /api/drafts/:key - Saved editor text
pub async fn get_draft(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(key): Path<String>,
) -> Result<Json<DraftResponse>, AppError> {
    let user = caller.require_user()?;
    validate_key(&key)?;

    let value = state.drafts.get(user, &key)?;
    Ok(Json(DraftResponse { key, value }))
}

/// PUT /api/drafts/:key - Save editor text (debounced, last write wins)
pub async fn put_draft(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(key): Path<String>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = caller.require_user()?.to_string();
    validate_key(&key)?;

    let req: PutDraftRequest = read_json(request.into_body(), MAX_JSON_BODY).await?;
    state.drafts.put(&user, &key, &req.value)?;
    Ok(Json(SuccessResponse { success: true }))
}
