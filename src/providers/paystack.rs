//! Paystack adapter.
//!
//! Wire notes: bearer secret-key auth; amounts are sent in minor units
//! (kobo/pesewas) unchanged; webhooks carry an `x-paystack-signature` header
//! holding the hex HMAC-SHA512 of the raw body keyed by the secret key.

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;

use crate::config::ProviderSettings;
use crate::domain::{PaymentMethod, TxStatus};

use super::{InitiateRequest, ProviderAdapter, ProviderError, ProviderPayment, RestClient};

pub const PROVIDER_NAME: &str = "paystack";

type HmacSha512 = Hmac<Sha512>;

pub struct PaystackAdapter {
    client: RestClient,
    webhook_secret: String,
    countries: Vec<String>,
    currencies: Vec<String>,
    methods: Vec<PaymentMethod>,
}

impl PaystackAdapter {
    pub fn new(settings: &ProviderSettings, timeout_secs: u64) -> Self {
        Self {
            client: RestClient::new(
                settings.base_url.clone(),
                settings.secret_key.clone(),
                timeout_secs,
            ),
            webhook_secret: settings.webhook_secret.clone(),
            countries: settings.countries.clone(),
            currencies: settings.currencies.clone(),
            methods: settings.methods.clone(),
        }
    }

    fn verify_signature(&self, body: &[u8], headers: &HeaderMap) -> Result<(), ProviderError> {
        let signature = headers
            .get("x-paystack-signature")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ProviderError::InvalidSignature("missing x-paystack-signature header".into())
            })?;

        let expected = hex::decode(signature)
            .map_err(|_| ProviderError::InvalidSignature("signature is not hex".into()))?;

        let mut mac = HmacSha512::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| ProviderError::InvalidSignature("HMAC mismatch".into()))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    id: Option<u64>,
    reference: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[allow(dead_code)]
    event: Option<String>,
    data: ChargeData,
}

/// Paystack's status vocabulary, normalized. `abandoned` is the customer
/// walking away from checkout, a cancellation rather than a failure.
fn map_status(raw: &str) -> TxStatus {
    match raw.to_ascii_lowercase().as_str() {
        "success" => TxStatus::Success,
        "failed" | "reversed" => TxStatus::Failed,
        "abandoned" => TxStatus::Cancelled,
        _ => TxStatus::Pending,
    }
}

fn channels(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::MobileMoney => "mobile_money",
        PaymentMethod::BankTransfer => "bank_transfer",
        PaymentMethod::Ussd => "ussd",
    }
}

#[async_trait]
impl ProviderAdapter for PaystackAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn initiate_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<ProviderPayment, ProviderError> {
        // Paystack already bills in minor units; no conversion.
        let body = json!({
            "reference": request.tx_ref,
            "email": request.customer_email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "callback_url": request.redirect_url,
            "channels": [channels(request.method)],
            "metadata": request.metadata,
        });

        let envelope: Envelope<InitializeData> =
            self.client.post_json("/transaction/initialize", &body).await?;
        let raw = json!({
            "status": envelope.status,
            "message": envelope.message,
            "authorization_url": envelope.data.as_ref().map(|d| d.authorization_url.clone()),
        });

        let data = match envelope.data {
            Some(d) if envelope.status => d,
            _ => {
                return Err(ProviderError::Rejected(
                    envelope.message.unwrap_or_else(|| "initialize failed".into()),
                ))
            }
        };

        Ok(ProviderPayment {
            tx_ref: data.reference,
            provider_reference: None,
            status: TxStatus::Pending,
            checkout_url: Some(data.authorization_url),
            raw,
        })
    }

    async fn verify_payment(
        &self,
        tx_ref: &str,
        _provider_reference: Option<&str>,
    ) -> Result<ProviderPayment, ProviderError> {
        let path = format!("/transaction/verify/{}", tx_ref);
        let envelope: Envelope<ChargeData> = self.client.get_json(&path).await?;

        let data = match envelope.data {
            Some(d) if envelope.status => d,
            _ => {
                return Err(ProviderError::Rejected(
                    envelope.message.unwrap_or_else(|| "verify failed".into()),
                ))
            }
        };

        let raw = json!({
            "id": data.id,
            "reference": data.reference,
            "status": data.status,
        });

        Ok(ProviderPayment {
            tx_ref: data.reference,
            provider_reference: data.id.map(|id| id.to_string()),
            status: map_status(&data.status),
            checkout_url: None,
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<ProviderPayment, ProviderError> {
        self.verify_signature(body, headers)?;

        let parsed: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        let raw: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();

        Ok(ProviderPayment {
            tx_ref: parsed.data.reference,
            provider_reference: parsed.data.id.map(|id| id.to_string()),
            status: map_status(&parsed.data.status),
            checkout_url: None,
            raw,
        })
    }

    fn supported_methods(&self, country: &str) -> Vec<PaymentMethod> {
        if !self.countries.iter().any(|c| c == country) {
            return Vec::new();
        }
        self.methods
            .iter()
            .copied()
            // Paystack mobile money is live in Ghana and Kenya only.
            .filter(|m| *m != PaymentMethod::MobileMoney || country == "GH" || country == "KE")
            .collect()
    }

    fn supported_currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        let envelope: Envelope<serde_json::Value> =
            self.client.get_json("/transaction?perPage=1").await?;
        if !envelope.status {
            return Err(ProviderError::InvalidCredentials(
                envelope.message.unwrap_or_else(|| "key rejected".into()),
            ));
        }
        Ok(())
    }
}
