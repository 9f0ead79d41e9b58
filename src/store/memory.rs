//! In-memory TransactionStore.
//!
//! Mirrors the Postgres implementation's compare-and-set semantics exactly;
//! used by the test suites and for local development without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{check_transition, Transaction, Transition, TxStatus};

use super::{
    AuditEntry, AuditStage, EventKind, GatewayEvent, StoreError, StoreResult, TransactionStore,
    TransitionOutcome,
};

#[derive(Default)]
struct Inner {
    transactions: HashMap<String, Transaction>,
    audit: Vec<AuditEntry>,
    events: Vec<GatewayEvent>,
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    inner: Mutex<Inner>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut inner = self.inner.lock().unwrap();
        if inner.transactions.contains_key(&tx.tx_ref) {
            return Err(StoreError::DuplicateTxRef(tx.tx_ref.clone()));
        }
        inner.transactions.insert(tx.tx_ref.clone(), tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.transactions.get(tx_ref).cloned())
    }

    async fn get_by_provider_reference(
        &self,
        provider: &str,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .transactions
            .values()
            .find(|tx| {
                tx.provider == provider && tx.provider_reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn transition(
        &self,
        tx_ref: &str,
        to: TxStatus,
        provider_reference: Option<&str>,
    ) -> StoreResult<TransitionOutcome> {
        if !to.is_terminal() {
            return Err(StoreError::Backend(
                "transition target must be terminal".into(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        let tx = inner
            .transactions
            .get_mut(tx_ref)
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;

        match check_transition(tx.status, to) {
            Transition::Apply => {
                tx.status = to;
                if tx.provider_reference.is_none() {
                    tx.provider_reference = provider_reference.map(str::to_string);
                }
                tx.updated_at = Utc::now();
                tx.last_verified_at = Some(tx.updated_at);
                Ok(TransitionOutcome::Applied(tx.clone()))
            }
            Transition::Noop => Ok(TransitionOutcome::Noop(tx.clone())),
            Transition::Conflict => Ok(TransitionOutcome::Conflict(tx.clone())),
        }
    }

    async fn touch_verified(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let tx = inner
            .transactions
            .get_mut(tx_ref)
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;
        tx.last_verified_at = Some(Utc::now());
        if tx.provider_reference.is_none() {
            tx.provider_reference = provider_reference.map(str::to_string);
        }
        Ok(())
    }

    async fn attach_initiation(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
        checkout_url: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let tx = inner
            .transactions
            .get_mut(tx_ref)
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;
        if tx.provider_reference.is_none() {
            tx.provider_reference = provider_reference.map(str::to_string);
        }
        tx.checkout_url = checkout_url.map(str::to_string);
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        verified_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|tx| tx.status == TxStatus::Pending && tx.created_at < created_before)
            .filter(|tx| match tx.last_verified_at {
                Some(at) => at < verified_before,
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by_key(|tx| tx.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn append_audit(
        &self,
        tx_ref: &str,
        stage: AuditStage,
        payload: &serde_json::Value,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.audit.push(AuditEntry {
            id: Uuid::new_v4(),
            tx_ref: tx_ref.to_string(),
            stage,
            payload: payload.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn audit_trail(&self, tx_ref: &str) -> StoreResult<Vec<AuditEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.tx_ref == tx_ref)
            .cloned()
            .collect())
    }

    async fn record_event(&self, event: &GatewayEvent) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push(event.clone());
        Ok(())
    }

    async fn recent_events(
        &self,
        kind: Option<EventKind>,
        limit: i64,
    ) -> StoreResult<Vec<GatewayEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<GatewayEvent> = inner
            .events
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
