//! Transaction store contract.
//!
//! The store is the single source of truth for payment status. Status
//! mutation goes through [`TransactionStore::transition`], an atomic
//! compare-and-set on the stored status, which is what makes concurrent
//! webhook delivery and reconciliation safe without any global lock.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, TxStatus};

pub use memory::MemoryTransactionStore;
pub use postgres::PostgresTransactionStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate tx_ref: {0}")]
    DuplicateTxRef(String),

    #[error("corrupt stored record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an atomic conditional status transition.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The row moved from pending to the requested terminal state.
    Applied(Transaction),
    /// The row was already in the requested state (idempotent redelivery).
    Noop(Transaction),
    /// The row is in a different terminal state; nothing was written.
    Conflict(Transaction),
}

impl TransitionOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            TransitionOutcome::Applied(tx)
            | TransitionOutcome::Noop(tx)
            | TransitionOutcome::Conflict(tx) => tx,
        }
    }
}

/// Stages of the append-only audit trail. Payloads are never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    InitiationRequest,
    InitiationResponse,
    Verification,
    Webhook,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStage::InitiationRequest => "initiation_request",
            AuditStage::InitiationResponse => "initiation_response",
            AuditStage::Verification => "verification",
            AuditStage::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tx_ref: String,
    pub stage: AuditStage,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Operator-facing events: things that require a human to look at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OrphanWebhook,
    SignatureFailure,
    ReconciliationAnomaly,
    ProviderUnreachable,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrphanWebhook => "orphan_webhook",
            EventKind::SignatureFailure => "signature_failure",
            EventKind::ReconciliationAnomaly => "reconciliation_anomaly",
            EventKind::ProviderUnreachable => "provider_unreachable",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orphan_webhook" => Ok(EventKind::OrphanWebhook),
            "signature_failure" => Ok(EventKind::SignatureFailure),
            "reconciliation_anomaly" => Ok(EventKind::ReconciliationAnomaly),
            "provider_unreachable" => Ok(EventKind::ProviderUnreachable),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayEvent {
    pub id: Uuid,
    pub tx_ref: Option<String>,
    pub provider: String,
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GatewayEvent {
    pub fn new(
        kind: EventKind,
        provider: &str,
        tx_ref: Option<&str>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_ref: tx_ref.map(str::to_string),
            provider: provider.to_string(),
            kind,
            detail,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<Transaction>>;

    async fn get_by_provider_reference(
        &self,
        provider: &str,
        reference: &str,
    ) -> StoreResult<Option<Transaction>>;

    /// Atomic conditional transition to a terminal state: applied only if
    /// the stored status is still pending. `provider_reference` is attached
    /// when newly learned, never overwritten with NULL.
    async fn transition(
        &self,
        tx_ref: &str,
        to: TxStatus,
        provider_reference: Option<&str>,
    ) -> StoreResult<TransitionOutcome>;

    /// Records a verification pass that reported pending: bumps
    /// last_verified_at (the reconciler cooldown) and fills in a newly
    /// learned provider reference.
    async fn touch_verified(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
    ) -> StoreResult<()>;

    /// Attaches the initiation response artifacts to a pending row.
    async fn attach_initiation(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
        checkout_url: Option<&str>,
    ) -> StoreResult<()>;

    /// Pending rows created before `created_before` whose last verification
    /// (if any) predates `verified_before`, oldest first.
    async fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        verified_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>>;

    async fn append_audit(
        &self,
        tx_ref: &str,
        stage: AuditStage,
        payload: &serde_json::Value,
    ) -> StoreResult<()>;

    async fn audit_trail(&self, tx_ref: &str) -> StoreResult<Vec<AuditEntry>>;

    async fn record_event(&self, event: &GatewayEvent) -> StoreResult<()>;

    async fn recent_events(
        &self,
        kind: Option<EventKind>,
        limit: i64,
    ) -> StoreResult<Vec<GatewayEvent>>;

    async fn ping(&self) -> StoreResult<()>;
}
