//! Enrichment handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Extension, Json,
};
use serde::Deserialize;

use tally_core::ai::InlineDocument;
use tally_core::enrich::{EnrichmentOutcome, ReferenceDocument};
use tally_core::models::EnrichmentLog;

use super::{owned_statement, read_json};
use crate::{AppError, AppState, Caller, MAX_UPLOAD_SIZE};

/// A reference image or document, base64 encoded
#[derive(Debug, Deserialize)]
pub struct ReferenceImage {
    pub name: Option<String>,
    /// Base64 data, optionally as a `data:` URL
    pub data: String,
    #[serde(alias = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    #[serde(default)]
    pub images: Vec<ReferenceImage>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Base64 payload of a `data:<mime>;base64,<payload>` URL, or the input as is
pub(crate) fn strip_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some((_, payload)) = data.split_once(',') {
            return payload;
        }
    }
    data
}

impl EnrichRequest {
    fn documents(&self) -> Vec<ReferenceDocument> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, image)| ReferenceDocument {
                name: image
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Image {}", i + 1)),
                document: InlineDocument {
                    mime_type: image.mime_type.clone(),
                    data: strip_data_url(&image.data).to_string(),
                },
            })
            .collect()
    }
}

/// POST /api/statements/:id/enrich - Fill in transaction details from reference documents
pub async fn enrich_statement(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<EnrichmentOutcome>, AppError> {
    let user = caller.require_user()?.to_string();
    owned_statement(&state, &user, id)?;

    let enricher = state.enricher()?;
    // Base64 grows payloads by a third
    let req: EnrichRequest = read_json(request.into_body(), MAX_UPLOAD_SIZE * 2).await?;
    if req.images.iter().any(|image| image.data.trim().is_empty()) {
        return Err(AppError::bad_request("Each image needs data and mime_type"));
    }

    let outcome = enricher
        .enrich_statement(id, &req.documents(), req.remarks.as_deref().unwrap_or(""))
        .await
        .map_err(AppError::from_core)?;
    Ok(Json(outcome))
}

/// GET /api/statements/:id/enrichment-logs - Enrichment history, newest first
pub async fn list_enrichment_logs(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<EnrichmentLog>>, AppError> {
    let user = caller.require_user()?;
    owned_statement(&state, user, id)?;
    Ok(Json(state.db.list_enrichment_logs(id)?))
}
