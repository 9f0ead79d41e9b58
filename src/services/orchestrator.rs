//! Orchestration service: the façade callers use to initiate and verify
//! payments. Owns all Transaction writes and funnels every status change
//! (webhook, explicit verify, reconciliation) through one transition path.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::domain::{
    generate_tx_ref, money, Customer, PaymentMethod, Transaction, TxStatus,
};
use crate::error::AppError;
use crate::providers::{InitiateRequest, ProviderError, ProviderPayment};
use crate::router::{Corridor, ProviderRegistry};
use crate::store::{AuditStage, EventKind, GatewayEvent, TransactionStore, TransitionOutcome};

/// Caller-facing initiation request.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePayment {
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub country: String,
    pub method: PaymentMethod,
    pub customer: Customer,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Result of a verify call: the stored row plus whether the provider's
/// source of truth was actually reached on this pass.
#[derive(Debug)]
pub struct VerifiedTransaction {
    pub transaction: Transaction,
    pub verified: bool,
}

pub struct OrchestrationService {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn TransactionStore>,
}

impl OrchestrationService {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn TransactionStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Initiates a payment attempt. The caller always receives a well-formed
    /// Transaction or a synchronous ValidationError/NoProviderAvailable; a
    /// provider failure is captured on the row, never thrown past it.
    pub async fn initiate_payment(&self, request: InitiatePayment) -> Result<Transaction, AppError> {
        validate(&request)?;

        let corridor = Corridor {
            country: request.country.clone(),
            currency: request.currency.clone(),
            method: request.method,
        };
        let eligible = self.registry.eligible(&corridor);
        let adapter = eligible
            .first()
            .cloned()
            .ok_or_else(|| AppError::NoProviderAvailable(corridor.to_string()))?;

        let now = Utc::now();
        let tx_ref = generate_tx_ref(adapter.name(), &request.order_id, now);

        // Persist before the outbound call: if we crash mid-initiation the
        // reconciler can still resolve the attempt by tx_ref.
        let tx = Transaction::new(
            request.order_id.clone(),
            tx_ref.clone(),
            adapter.name().to_string(),
            request.amount_minor,
            request.currency.clone(),
            request.country.clone(),
            request.method,
            request.customer.clone(),
        );
        let tx = self.store.insert(&tx).await?;

        let outbound = InitiateRequest {
            tx_ref: tx_ref.clone(),
            order_id: request.order_id.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            country: request.country.clone(),
            method: request.method,
            customer_name: request.customer.name.clone(),
            customer_email: request.customer.email.clone(),
            customer_phone: request.customer.phone.clone(),
            redirect_url: request.redirect_url.clone(),
            metadata: request.metadata.clone(),
        };
        self.store
            .append_audit(
                &tx_ref,
                AuditStage::InitiationRequest,
                &json!({
                    "order_id": outbound.order_id,
                    "amount_minor": outbound.amount_minor,
                    "currency": outbound.currency,
                    "country": outbound.country,
                    "method": outbound.method,
                    "customer_email": outbound.customer_email,
                }),
            )
            .await?;

        match adapter.initiate_payment(&outbound).await {
            Ok(payment) => {
                self.store
                    .append_audit(&tx_ref, AuditStage::InitiationResponse, &payment.raw)
                    .await?;
                if payment.status == TxStatus::Failed {
                    self.store
                        .transition(&tx_ref, TxStatus::Failed, payment.provider_reference.as_deref())
                        .await?;
                } else {
                    self.store
                        .attach_initiation(
                            &tx_ref,
                            payment.provider_reference.as_deref(),
                            payment.checkout_url.as_deref(),
                        )
                        .await?;
                }
            }
            Err(e) if e.is_retryable() => {
                // The provider may have received the request; the tx_ref is
                // the reconciliation key, so the row stays pending and the
                // reconciler settles it.
                tracing::warn!(tx_ref = %tx_ref, error = %e, "initiation unconfirmed, left pending");
                self.store
                    .append_audit(
                        &tx_ref,
                        AuditStage::InitiationResponse,
                        &json!({"error": e.to_string(), "retryable": true}),
                    )
                    .await?;
            }
            Err(e) => {
                tracing::warn!(tx_ref = %tx_ref, error = %e, "initiation rejected");
                self.store
                    .append_audit(
                        &tx_ref,
                        AuditStage::InitiationResponse,
                        &json!({"error": e.to_string(), "retryable": false}),
                    )
                    .await?;
                self.store.transition(&tx_ref, TxStatus::Failed, None).await?;
            }
        }

        let stored = self
            .store
            .get_by_tx_ref(&tx_ref)
            .await?
            .ok_or_else(|| AppError::Internal(format!("transaction {} vanished", tx_ref)))?;
        tracing::info!(
            tx_ref = %stored.tx_ref,
            provider = %stored.provider,
            status = %stored.status,
            "payment initiated"
        );
        Ok(stored)
    }

    /// Re-checks a pending transaction against the provider's source of
    /// truth. Terminal rows are returned as stored; a transaction never
    /// leaves a terminal state.
    pub async fn verify_payment(&self, tx_ref: &str) -> Result<VerifiedTransaction, AppError> {
        let tx = self
            .store
            .get_by_tx_ref(tx_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", tx_ref)))?;

        if tx.status.is_terminal() {
            return Ok(VerifiedTransaction {
                transaction: tx,
                verified: true,
            });
        }

        let adapter = self.registry.get(&tx.provider).ok_or_else(|| {
            AppError::Internal(format!("provider {} is no longer configured", tx.provider))
        })?;

        match adapter
            .verify_payment(&tx.tx_ref, tx.provider_reference.as_deref())
            .await
        {
            Ok(payment) => {
                let transaction = self
                    .apply_provider_payment(&tx, &payment, AuditStage::Verification)
                    .await?;
                Ok(VerifiedTransaction {
                    transaction,
                    verified: true,
                })
            }
            Err(e) => {
                // Communication failures are not an outcome: the row stays
                // pending and the reconciler retries on its next pass.
                tracing::warn!(tx_ref = %tx.tx_ref, provider = %tx.provider, error = %e, "verify failed");
                self.store
                    .append_audit(
                        &tx.tx_ref,
                        AuditStage::Verification,
                        &json!({"error": e.to_string()}),
                    )
                    .await?;
                Ok(VerifiedTransaction {
                    transaction: tx,
                    verified: false,
                })
            }
        }
    }

    pub fn list_supported_methods(&self, country: &str) -> Result<Vec<PaymentMethod>, AppError> {
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(AppError::Validation(
                "country must be a two-letter ISO code".into(),
            ));
        }
        Ok(self.registry.methods_for_country(country))
    }

    /// Locates the transaction a normalized provider payload refers to,
    /// by tx_ref first and provider reference second.
    pub async fn find_for_payment(
        &self,
        provider: &str,
        payment: &ProviderPayment,
    ) -> Result<Option<Transaction>, AppError> {
        if let Some(tx) = self.store.get_by_tx_ref(&payment.tx_ref).await? {
            return Ok(Some(tx));
        }
        if let Some(reference) = payment.provider_reference.as_deref() {
            return Ok(self
                .store
                .get_by_provider_reference(provider, reference)
                .await?);
        }
        Ok(None)
    }

    /// The single transition path. Appends the payload to the audit trail,
    /// then applies the state machine via the store's conditional write.
    /// A terminal-vs-terminal conflict is recorded as an anomaly and the
    /// stored status wins.
    pub async fn apply_provider_payment(
        &self,
        tx: &Transaction,
        payment: &ProviderPayment,
        stage: AuditStage,
    ) -> Result<Transaction, AppError> {
        self.store.append_audit(&tx.tx_ref, stage, &payment.raw).await?;

        if payment.status == TxStatus::Pending {
            self.store
                .touch_verified(&tx.tx_ref, payment.provider_reference.as_deref())
                .await?;
            return Ok(self
                .store
                .get_by_tx_ref(&tx.tx_ref)
                .await?
                .unwrap_or_else(|| tx.clone()));
        }

        let outcome = self
            .store
            .transition(
                &tx.tx_ref,
                payment.status,
                payment.provider_reference.as_deref(),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied(updated) => {
                tracing::info!(
                    tx_ref = %updated.tx_ref,
                    from = %TxStatus::Pending,
                    to = %updated.status,
                    "status transition applied"
                );
                Ok(updated)
            }
            TransitionOutcome::Noop(stored) => Ok(stored),
            TransitionOutcome::Conflict(stored) => {
                tracing::error!(
                    tx_ref = %stored.tx_ref,
                    stored_status = %stored.status,
                    incoming_status = %payment.status,
                    "conflicting terminal states, manual review required"
                );
                self.store
                    .record_event(&GatewayEvent::new(
                        EventKind::ReconciliationAnomaly,
                        &stored.provider,
                        Some(&stored.tx_ref),
                        json!({
                            "stored_status": stored.status,
                            "incoming_status": payment.status,
                            "payload": payment.raw,
                        }),
                    ))
                    .await?;
                Ok(stored)
            }
        }
    }

    /// Marks a transaction that outlived the pending age cap as failed.
    pub async fn fail_unreachable(&self, tx: &Transaction) -> Result<(), AppError> {
        let outcome = self
            .store
            .transition(&tx.tx_ref, TxStatus::Failed, None)
            .await?;
        if matches!(outcome, TransitionOutcome::Applied(_)) {
            tracing::warn!(tx_ref = %tx.tx_ref, provider = %tx.provider, "pending past max age, failing");
            self.store
                .record_event(&GatewayEvent::new(
                    EventKind::ProviderUnreachable,
                    &tx.provider,
                    Some(&tx.tx_ref),
                    json!({"reason": "provider unreachable", "created_at": tx.created_at}),
                ))
                .await?;
        }
        Ok(())
    }
}

fn validate(request: &InitiatePayment) -> Result<(), AppError> {
    if request.order_id.is_empty() || request.order_id.len() > 64 {
        return Err(AppError::Validation(
            "order_id must be 1-64 characters".into(),
        ));
    }
    if request
        .order_id
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
    {
        return Err(AppError::Validation(
            "order_id may only contain alphanumerics, '-' and '_'".into(),
        ));
    }
    if request.amount_minor <= 0 {
        return Err(AppError::Validation("amount_minor must be positive".into()));
    }
    if money::minor_unit_exponent(&request.currency).is_none() {
        return Err(AppError::Validation(format!(
            "unsupported currency {}",
            request.currency
        )));
    }
    if request.country.len() != 2 || !request.country.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(
            "country must be a two-letter ISO code".into(),
        ));
    }
    if !request.customer.email.contains('@') {
        return Err(AppError::Validation("customer email is malformed".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InitiatePayment {
        InitiatePayment {
            order_id: "order123".into(),
            amount_minor: 5000,
            currency: "XOF".into(),
            country: "CI".into(),
            method: PaymentMethod::MobileMoney,
            customer: Customer {
                name: None,
                email: "awa@example.ci".into(),
                phone: None,
            },
            redirect_url: None,
            metadata: None,
        }
    }

    #[test]
    fn test_validate_accepts_good_request() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_amount() {
        let mut r = request();
        r.amount_minor = 0;
        assert!(matches!(validate(&r), Err(AppError::Validation(_))));
        r.amount_minor = -100;
        assert!(matches!(validate(&r), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_currency() {
        let mut r = request();
        r.currency = "ABC".into();
        assert!(matches!(validate(&r), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_country_and_order_id() {
        let mut r = request();
        r.country = "Côte".into();
        assert!(validate(&r).is_err());

        let mut r = request();
        r.order_id = "order 123".into();
        assert!(validate(&r).is_err());

        let mut r = request();
        r.order_id = String::new();
        assert!(validate(&r).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let mut r = request();
        r.customer.email = "not-an-email".into();
        assert!(validate(&r).is_err());
    }
}
