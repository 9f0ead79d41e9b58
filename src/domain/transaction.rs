//! Transaction domain entity and status state machine.
//! Framework-agnostic; the store and handlers map in and out of this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Uniform payment status. Every provider vocabulary is normalized to these
/// values by its adapter before anything else sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
            TxStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "success" => Ok(TxStatus::Success),
            "failed" => Ok(TxStatus::Failed),
            "cancelled" => Ok(TxStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking a proposed status transition against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stored state is pending and the incoming state differs: apply it.
    Apply,
    /// Incoming state equals the stored state: idempotent redelivery, no-op.
    Noop,
    /// Stored state is terminal and the incoming state differs: never
    /// applied, recorded as an anomaly.
    Conflict,
}

/// Pending may move to any state; a terminal state only accepts itself.
pub fn check_transition(current: TxStatus, incoming: TxStatus) -> Transition {
    if current == incoming {
        return Transition::Noop;
    }
    match current {
        TxStatus::Pending => Transition::Apply,
        _ => Transition::Conflict,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    BankTransfer,
    Ussd,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Ussd => "ussd",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "ussd" => Ok(PaymentMethod::Ussd),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer details are opaque to the engine; passed through to providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
}

/// One payment attempt. `tx_ref` is assigned at initiation and never
/// mutated; it is the join key for both webhook and polling paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: String,
    pub tx_ref: String,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub country: String,
    pub method: PaymentMethod,
    pub status: TxStatus,
    pub customer: Customer,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: String,
        tx_ref: String,
        provider: String,
        amount_minor: i64,
        currency: String,
        country: String,
        method: PaymentMethod,
        customer: Customer,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            tx_ref,
            provider,
            provider_reference: None,
            amount_minor,
            currency,
            country,
            method,
            status: TxStatus::Pending,
            customer,
            checkout_url: None,
            created_at: now,
            updated_at: now,
            last_verified_at: None,
        }
    }
}

/// Idempotency key sent to the provider, e.g. `FLUTTERWAVE_order123_1714000000`.
/// Generated before any network call so the attempt stays reconcilable by
/// reference even if the process crashes mid-initiation.
pub fn generate_tx_ref(provider: &str, order_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", provider.to_uppercase(), order_id, at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_moves_to_any_terminal() {
        for to in [TxStatus::Success, TxStatus::Failed, TxStatus::Cancelled] {
            assert_eq!(check_transition(TxStatus::Pending, to), Transition::Apply);
        }
    }

    #[test]
    fn test_same_state_is_noop() {
        for s in [
            TxStatus::Pending,
            TxStatus::Success,
            TxStatus::Failed,
            TxStatus::Cancelled,
        ] {
            assert_eq!(check_transition(s, s), Transition::Noop);
        }
    }

    #[test]
    fn test_terminal_conflict_detected() {
        assert_eq!(
            check_transition(TxStatus::Success, TxStatus::Failed),
            Transition::Conflict
        );
        assert_eq!(
            check_transition(TxStatus::Failed, TxStatus::Success),
            Transition::Conflict
        );
        assert_eq!(
            check_transition(TxStatus::Cancelled, TxStatus::Success),
            Transition::Conflict
        );
        // A late "pending" report never reopens a terminal transaction.
        assert_eq!(
            check_transition(TxStatus::Success, TxStatus::Pending),
            Transition::Conflict
        );
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "success", "failed", "cancelled"] {
            assert_eq!(s.parse::<TxStatus>().unwrap().as_str(), s);
        }
        assert!("successful".parse::<TxStatus>().is_err());
    }

    #[test]
    fn test_tx_ref_format() {
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            generate_tx_ref("flutterwave", "order123", at),
            format!("FLUTTERWAVE_order123_{}", at.timestamp())
        );
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let tx = Transaction::new(
            "order-1".into(),
            "PROV_order-1_1".into(),
            "prov".into(),
            5000,
            "XOF".into(),
            "CI".into(),
            PaymentMethod::MobileMoney,
            Customer {
                name: None,
                email: "a@b.ci".into(),
                phone: None,
            },
        );
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(tx.provider_reference.is_none());
        assert!(tx.last_verified_at.is_none());
    }
}
