//! Statement status change stream (server-sent events)
//!
//! Each connection gets the statement's current status first, then every
//! later status change of that statement as a `status` event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use tally_core::db::StatusEvent;

use crate::{AppError, AppState, Caller};

/// GET /api/statements/:id/events - Stream status changes of a statement
pub async fn statement_events(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let user = caller.require_user()?;

    // Subscribe before reading the current status so no change is missed
    let rx = state.db.subscribe();
    let statement = state
        .db
        .get_user_statement(id, user)?
        .ok_or_else(|| AppError::not_found("Statement not found"))?;

    let current = StatusEvent {
        statement_id: id,
        status: statement.status,
        error: None,
    };

    let updates = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.statement_id == id => return Some((event, rx)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(statement_id = id, skipped, "Status subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    debug!(statement_id = id, "Status stream opened");
    let events = stream::once(async move { current })
        .chain(updates)
        .map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &StatusEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("status").data(data)
}
