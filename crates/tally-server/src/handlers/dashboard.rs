//! Dashboard handler

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use tally_core::models::TransactionType;
use tally_core::{dashboard, Dashboard, MonthPeriod};

use crate::{AppError, AppState, Caller};

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub month: Option<String>,
    pub year: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub q: Option<String>,
}

/// GET /api/dashboard - Month summary and transactions
///
/// Missing or out-of-range month/year fall back to the current month.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let user = caller.require_user()?;

    let period = MonthPeriod::from_params(
        params.month.as_deref(),
        params.year.as_deref(),
        Utc::now().date_naive(),
    );
    // Unknown types mean "all", like the month/year fallback
    let transaction_type = params
        .transaction_type
        .as_deref()
        .and_then(|t| t.parse::<TransactionType>().ok());
    let search = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    Ok(Json(dashboard(
        &state.db,
        user,
        period,
        transaction_type,
        search,
    )?))
}
