//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod auth;
pub mod dashboard;
pub mod drafts;
pub mod enrichment;
pub mod functions;
pub mod statements;
pub mod transactions;

// Re-export all handlers for use in router
pub use auth::*;
pub use dashboard::*;
pub use drafts::*;
pub use enrichment::*;
pub use functions::*;
pub use statements::*;
pub use transactions::*;

use axum::body::Body;
use serde::de::DeserializeOwned;

use tally_core::models::{Statement, Transaction};

use crate::{AppError, AppState};

/// Read a JSON request body of at most `limit` bytes
pub(crate) async fn read_json<T: DeserializeOwned>(body: Body, limit: usize) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))
}

/// A statement of `user`; other users' statements are reported as missing
pub(crate) fn owned_statement(state: &AppState, user: &str, id: i64) -> Result<Statement, AppError> {
    state
        .db
        .get_user_statement(id, user)?
        .ok_or_else(|| AppError::not_found("Statement not found"))
}

/// A transaction of `user`; other users' transactions are reported as missing
pub(crate) fn owned_transaction(
    state: &AppState,
    user: &str,
    id: i64,
) -> Result<Transaction, AppError> {
    state
        .db
        .get_transaction(id)?
        .filter(|t| t.user_id == user)
        .ok_or_else(|| AppError::not_found("Transaction not found"))
}
