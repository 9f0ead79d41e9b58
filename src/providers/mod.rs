//! Provider adapter contract.
//!
//! Each external provider has a bespoke wire protocol and status vocabulary
//! ("successful", "success", "abandoned", ...). The adapter is the single
//! place that vocabulary is translated; the rest of the engine only ever
//! sees [`TxStatus`] and [`ProviderPayment`].

pub mod client;
pub mod flutterwave;
pub mod paystack;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

use crate::domain::{PaymentMethod, TxStatus};

pub use client::RestClient;
pub use flutterwave::FlutterwaveAdapter;
pub use paystack::PaystackAdapter;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Communication(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider circuit breaker open")]
    CircuitOpen,

    #[error("webhook signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("unexpected provider payload: {0}")]
    InvalidPayload(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Communication(e.to_string())
        }
    }
}

impl ProviderError {
    /// Timeouts and transport failures leave the transaction PENDING and are
    /// retried by the reconciler; everything else is a hard outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Communication(_) | ProviderError::Timeout | ProviderError::CircuitOpen
        )
    }
}

/// Uniform shape every adapter call normalizes to.
#[derive(Debug, Clone)]
pub struct ProviderPayment {
    pub tx_ref: String,
    pub provider_reference: Option<String>,
    pub status: TxStatus,
    pub checkout_url: Option<String>,
    /// Raw provider payload, appended to the transaction's audit trail.
    pub raw: serde_json::Value,
}

/// Initiation request as the adapter sees it. `tx_ref` is generated by the
/// orchestrator before the row is persisted, so it is already final here.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub tx_ref: String,
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub country: String,
    pub method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Starts a payment at the provider. Never returns Success: redirect
    /// based flows are only ever Pending (or Failed) immediately after
    /// initiation.
    async fn initiate_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<ProviderPayment, ProviderError>;

    /// Queries the provider's source of truth. Idempotent, safe to call
    /// repeatedly; used by both GET /payments and the reconciler.
    async fn verify_payment(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
    ) -> Result<ProviderPayment, ProviderError>;

    /// Verifies authenticity and normalizes a webhook delivery. Fails
    /// closed: an unverifiable signature is an error, never a payment.
    async fn handle_webhook(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<ProviderPayment, ProviderError>;

    fn supported_methods(&self, country: &str) -> Vec<PaymentMethod>;

    fn supported_currencies(&self) -> Vec<String>;

    /// Lightweight connectivity/auth check for startup diagnostics. Never
    /// called on the hot path.
    async fn validate_credentials(&self) -> Result<(), ProviderError>;
}

/// Constant-time byte comparison for webhook secrets that are compared
/// literally rather than via HMAC.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Communication("reset".into()).is_retryable());
        assert!(ProviderError::CircuitOpen.is_retryable());
        assert!(!ProviderError::Rejected("declined".into()).is_retryable());
        assert!(!ProviderError::InvalidSignature("bad".into()).is_retryable());
    }
}
