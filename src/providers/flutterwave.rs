//! Flutterwave adapter.
//!
//! Wire notes: bearer secret-key auth; amounts are sent in major units as a
//! decimal string; webhooks carry a `verif-hash` header that must equal the
//! configured secret hash (compared in constant time, not an HMAC).

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderSettings;
use crate::domain::money;
use crate::domain::{PaymentMethod, TxStatus};

use super::{
    constant_time_eq, InitiateRequest, ProviderAdapter, ProviderError, ProviderPayment, RestClient,
};

pub const PROVIDER_NAME: &str = "flutterwave";

pub struct FlutterwaveAdapter {
    client: RestClient,
    webhook_secret: String,
    countries: Vec<String>,
    currencies: Vec<String>,
    methods: Vec<PaymentMethod>,
}

impl FlutterwaveAdapter {
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
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    id: serde_json::Value,
    tx_ref: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[allow(dead_code)]
    event: Option<String>,
    data: ChargeData,
}

/// Flutterwave's status vocabulary, normalized.
fn map_status(raw: &str) -> TxStatus {
    match raw.to_ascii_lowercase().as_str() {
        "successful" | "completed" => TxStatus::Success,
        "failed" | "error" => TxStatus::Failed,
        "cancelled" | "voided" => TxStatus::Cancelled,
        _ => TxStatus::Pending,
    }
}

fn payment_option(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::MobileMoney => "mobilemoney",
        PaymentMethod::BankTransfer => "banktransfer",
        PaymentMethod::Ussd => "ussd",
    }
}

fn reference_of(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl ProviderAdapter for FlutterwaveAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn initiate_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<ProviderPayment, ProviderError> {
        // Flutterwave bills in major units; the conversion is integer-only.
        let amount = money::format_major_units(request.amount_minor, &request.currency)
            .ok_or_else(|| {
                ProviderError::InvalidPayload(format!("unsupported currency {}", request.currency))
            })?;

        let body = json!({
            "tx_ref": request.tx_ref,
            "amount": amount,
            "currency": request.currency,
            "redirect_url": request.redirect_url,
            "payment_options": payment_option(request.method),
            "customer": {
                "email": request.customer_email,
                "name": request.customer_name,
                "phonenumber": request.customer_phone,
            },
            "meta": request.metadata,
        });

        let envelope: Envelope<PaymentLink> = self.client.post_json("/v3/payments", &body).await?;
        let raw = json!({
            "status": envelope.status,
            "message": envelope.message,
            "link": envelope.data.as_ref().map(|d| d.link.clone()),
        });

        if envelope.status != "success" {
            return Err(ProviderError::Rejected(
                envelope.message.unwrap_or_else(|| envelope.status.clone()),
            ));
        }

        Ok(ProviderPayment {
            tx_ref: request.tx_ref.clone(),
            // The numeric transaction id only exists once the customer
            // completes the hosted checkout; it arrives via webhook/verify.
            provider_reference: None,
            status: TxStatus::Pending,
            checkout_url: envelope.data.map(|d| d.link),
            raw,
        })
    }

    async fn verify_payment(
        &self,
        tx_ref: &str,
        _provider_reference: Option<&str>,
    ) -> Result<ProviderPayment, ProviderError> {
        let path = format!("/v3/transactions/verify_by_reference?tx_ref={}", tx_ref);
        let envelope: Envelope<ChargeData> = self.client.get_json(&path).await?;

        let data = match envelope.data {
            Some(d) if envelope.status == "success" => d,
            _ => {
                return Err(ProviderError::Rejected(
                    envelope.message.unwrap_or_else(|| envelope.status.clone()),
                ))
            }
        };

        let raw = json!({
            "id": data.id,
            "tx_ref": data.tx_ref,
            "status": data.status,
        });

        Ok(ProviderPayment {
            tx_ref: data.tx_ref,
            provider_reference: reference_of(&data.id),
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
        let hash = headers
            .get("verif-hash")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ProviderError::InvalidSignature("missing verif-hash header".into()))?;

        if !constant_time_eq(hash.as_bytes(), self.webhook_secret.as_bytes()) {
            return Err(ProviderError::InvalidSignature("verif-hash mismatch".into()));
        }

        let parsed: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        let raw: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();

        Ok(ProviderPayment {
            tx_ref: parsed.data.tx_ref,
            provider_reference: reference_of(&parsed.data.id),
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
            // USSD is a Nigeria-only rail at this provider.
            .filter(|m| *m != PaymentMethod::Ussd || country == "NG")
            .collect()
    }

    fn supported_currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        let envelope: Envelope<serde_json::Value> = self.client.get_json("/v3/balances").await?;
        if envelope.status != "success" {
            return Err(ProviderError::InvalidCredentials(
                envelope.message.unwrap_or_else(|| envelope.status.clone()),
            ));
        }
        Ok(())
    }
}
