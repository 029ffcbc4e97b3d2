//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::db::TransactionFilter;
use tally_core::models::{
    DuplicatePair, Transaction, TransactionSource, TransactionStatus, TransactionType,
    TransactionUpdate,
};
use tally_core::MonthPeriod;

use super::{owned_transaction, read_json};
use crate::{AppError, AppState, Caller, SuccessResponse, MAX_JSON_BODY};

/// Query parameters for listing transactions
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    /// Month (1-12); with `year`, restricts to that calendar month
    pub month: Option<String>,
    pub year: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// Search over name, category, notes, and merchant
    pub q: Option<String>,
    pub statement_id: Option<i64>,
    pub status: Option<String>,
    pub source: Option<String>,
    /// Sort field (date, amount, name, category, created)
    pub sort: Option<String>,
    /// Sort direction (asc or desc)
    pub order: Option<String>,
}

/// Parse an optional enum query value, 400 on unknown values
fn parse_param<T: std::str::FromStr<Err = String>>(
    value: Option<&str>,
) -> Result<Option<T>, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "all")
        .map(|v| v.parse::<T>().map_err(|e| AppError::bad_request(&e)))
        .transpose()
}

/// GET /api/transactions - List the caller's transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = caller.require_user()?;

    let transaction_type = parse_param::<TransactionType>(params.transaction_type.as_deref())?;
    let status = parse_param::<TransactionStatus>(params.status.as_deref())?;
    let source = parse_param::<TransactionSource>(params.source.as_deref())?;

    let date_range = if params.month.is_some() || params.year.is_some() {
        let period = MonthPeriod::from_params(
            params.month.as_deref(),
            params.year.as_deref(),
            Utc::now().date_naive(),
        );
        Some(period.range())
    } else {
        None
    };

    let transactions = state.db.search_transactions(
        TransactionFilter::new()
            .user_id(Some(user))
            .statement_id(params.statement_id)
            .search(params.q.as_deref())
            .transaction_type(transaction_type)
            .status(status)
            .source(source)
            .date_range(date_range)
            .sort_field(params.sort.as_deref())
            .sort_order(params.order.as_deref()),
    )?;
    Ok(Json(transactions))
}

/// PATCH /api/transactions/:id - Update fields of a transaction
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user = caller.require_user()?.to_string();
    owned_transaction(&state, &user, id)?;

    let update: TransactionUpdate = read_json(request.into_body(), 1024 * 16).await?;
    if update.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    state
        .db
        .update_transaction(id, &update)
        .map_err(AppError::from_core)?;
    Ok(Json(owned_transaction(&state, &user, id)?))
}

/// One row of a bulk update
#[derive(Debug, Deserialize)]
pub struct BulkUpdateItem {
    pub id: i64,
    #[serde(flatten)]
    pub update: TransactionUpdate,
}

#[derive(Serialize)]
pub struct BulkUpdateResponse {
    pub updated: usize,
}

/// PATCH /api/transactions - Update several transactions, one after another
///
/// Rows that are missing or belong to another user are skipped.
pub async fn bulk_update_transactions(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Result<Json<BulkUpdateResponse>, AppError> {
    let user = caller.require_user()?.to_string();
    let items: Vec<BulkUpdateItem> = read_json(request.into_body(), MAX_JSON_BODY).await?;

    let mut updates = Vec::with_capacity(items.len());
    for item in items {
        if item.update.is_empty() {
            continue;
        }
        if owned_transaction(&state, &user, item.id).is_ok() {
            updates.push((item.id, item.update));
        }
    }

    let updated = state
        .db
        .update_transactions(&updates)
        .map_err(AppError::from_core)?;
    info!(updated, "Bulk updated transactions");
    Ok(Json(BulkUpdateResponse { updated }))
}

/// DELETE /api/transactions/:id - Delete a transaction
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = caller.require_user()?;
    owned_transaction(&state, user, id)?;
    state.db.delete_transaction(id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/duplicates - Reconciled receipts with the statement rows they matched
pub async fn list_duplicates(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<DuplicatePair>>, AppError> {
    let user = caller.require_user()?;
    Ok(Json(state.db.list_duplicates(user)?))
}

/// POST /api/transactions/:id/keep - Keep a duplicate as its own verified row
pub async fn keep_transaction(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    let user = caller.require_user()?.to_string();
    owned_transaction(&state, &user, id)?;
    state.db.keep_transaction(id)?;
    Ok(Json(owned_transaction(&state, &user, id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param::<TransactionType>(Some("income")).unwrap(),
            Some(TransactionType::Income)
        );
        assert_eq!(parse_param::<TransactionType>(Some("all")).unwrap(), None);
        assert_eq!(parse_param::<TransactionType>(Some(" ")).unwrap(), None);
        assert_eq!(parse_param::<TransactionType>(None).unwrap(), None);

        let err = parse_param::<TransactionStatus>(Some("bogus")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_bulk_item_flattens_update() {
        let item: BulkUpdateItem =
            serde_json::from_str(r#"{"id": 7, "category": "Food", "type": "income"}"#).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.update.category.as_deref(), Some("Food"));
        assert_eq!(item.update.transaction_type, Some(TransactionType::Income));
    }
}
