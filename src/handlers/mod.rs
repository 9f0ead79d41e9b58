pub mod events;
pub mod payments;
pub mod webhooks;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub providers: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.orchestrator.store().ping().await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let providers = state
        .orchestrator
        .registry()
        .all()
        .iter()
        .map(|a| a.name().to_string())
        .collect();

    let health_response = HealthStatus {
        status: if store_status == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        providers,
    };

    let status_code = if store_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
