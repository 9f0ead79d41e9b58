//! Per-provider webhook receiver.
//!
//! The body is taken raw (`Bytes`) so signatures are computed over the exact
//! payload the provider sent. A 200 is returned only after the transition,
//! or its idempotent no-op / anomaly record, is durably applied, so the
//! provider's retry semantics stay meaningful.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::providers::ProviderError;
use crate::store::{AuditStage, EventKind, GatewayEvent};
use crate::AppState;

pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let orchestrator = &state.orchestrator;
    let adapter = orchestrator
        .registry()
        .get(&provider)
        .ok_or_else(|| AppError::NotFound(format!("provider {}", provider)))?;

    let payment = match adapter.handle_webhook(&body, &headers).await {
        Ok(payment) => payment,
        Err(ProviderError::InvalidSignature(reason)) => {
            // Fail closed: no transaction mutation, but the attempt itself
            // is security-relevant and is recorded for operators.
            tracing::warn!(provider = %provider, reason = %reason, "webhook signature rejected");
            orchestrator
                .store()
                .record_event(&GatewayEvent::new(
                    EventKind::SignatureFailure,
                    &provider,
                    None,
                    json!({"reason": reason}),
                ))
                .await?;
            return Err(AppError::SignatureVerification(reason));
        }
        Err(ProviderError::InvalidPayload(reason)) => {
            return Err(AppError::Validation(format!("webhook payload: {}", reason)));
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    match orchestrator.find_for_payment(&provider, &payment).await? {
        Some(tx) => {
            let updated = orchestrator
                .apply_provider_payment(&tx, &payment, AuditStage::Webhook)
                .await?;
            Ok((
                StatusCode::OK,
                Json(json!({"tx_ref": updated.tx_ref, "status": updated.status})),
            ))
        }
        None => {
            // An authenticated webhook with no matching row usually means a
            // missed initiation record; park it for operator inspection
            // instead of dropping it.
            tracing::warn!(
                provider = %provider,
                tx_ref = %payment.tx_ref,
                "orphan webhook, no matching transaction"
            );
            orchestrator
                .store()
                .record_event(&GatewayEvent::new(
                    EventKind::OrphanWebhook,
                    &provider,
                    Some(&payment.tx_ref),
                    json!({
                        "provider_reference": payment.provider_reference,
                        "reported_status": payment.status,
                        "payload": payment.raw,
                    }),
                ))
                .await?;
            Ok((
                StatusCode::OK,
                Json(json!({"tx_ref": payment.tx_ref, "status": "orphan_recorded"})),
            ))
        }
    }
}
