//! Operator view over gateway events (orphan webhooks, signature failures,
//! reconciliation anomalies). Anomalies are never auto-resolved; this is
//! where a human finds them.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::store::EventKind;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub kind: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| k.parse::<EventKind>())
        .transpose()
        .map_err(AppError::Validation)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = state.orchestrator.store().recent_events(kind, limit).await?;
    Ok(Json(events))
}
