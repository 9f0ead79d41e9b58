use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{PaymentMethod, Transaction};
use crate::error::AppError;
use crate::services::InitiatePayment;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub verified: bool,
}

pub async fn initiate(
    State(state): State<AppState>,
    Json(request): Json<InitiatePayment>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.orchestrator.initiate_payment(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            transaction,
            verified: false,
        }),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.orchestrator.verify_payment(&tx_ref).await?;
    Ok(Json(TransactionResponse {
        transaction: result.transaction,
        verified: result.verified,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub country: String,
}

#[derive(Debug, Serialize)]
pub struct MethodsResponse {
    pub country: String,
    pub methods: Vec<PaymentMethod>,
}

pub async fn list_methods(
    State(state): State<AppState>,
    Query(query): Query<MethodsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let methods = state.orchestrator.list_supported_methods(&query.country)?;
    Ok(Json(MethodsResponse {
        country: query.country,
        methods,
    }))
}
