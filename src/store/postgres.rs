//! Postgres implementation of TransactionStore.
//!
//! The status transition is a single conditional UPDATE (`WHERE status =
//! 'pending'`), never read-modify-write, so a webhook and a concurrent
//! reconciliation check for the same row cannot double-apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Customer, Transaction, TxStatus};

use super::{
    AuditEntry, AuditStage, EventKind, GatewayEvent, StoreError, StoreResult, TransactionStore,
    TransitionOutcome,
};

#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

const TX_COLUMNS: &str = "id, order_id, tx_ref, provider, provider_reference, amount_minor, \
     currency, country, method, status, customer_name, customer_email, customer_phone, \
     checkout_url, created_at, updated_at, last_verified_at";

/// Internal row type for SQLx. Not exposed outside the store.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    order_id: String,
    tx_ref: String,
    provider: String,
    provider_reference: Option<String>,
    amount_minor: i64,
    currency: String,
    country: String,
    method: String,
    status: String,
    customer_name: Option<String>,
    customer_email: String,
    customer_phone: Option<String>,
    checkout_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_verified_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            order_id: self.order_id,
            tx_ref: self.tx_ref,
            provider: self.provider,
            provider_reference: self.provider_reference,
            amount_minor: self.amount_minor,
            currency: self.currency,
            country: self.country,
            method: self.method.parse().map_err(StoreError::Corrupt)?,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            customer: Customer {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
            },
            checkout_url: self.checkout_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_verified_at: self.last_verified_at,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, order_id, tx_ref, provider, provider_reference, amount_minor,
                currency, country, method, status, customer_name, customer_email,
                customer_phone, checkout_url, created_at, updated_at, last_verified_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            TX_COLUMNS
        ))
        .bind(tx.id)
        .bind(&tx.order_id)
        .bind(&tx.tx_ref)
        .bind(&tx.provider)
        .bind(&tx.provider_reference)
        .bind(tx.amount_minor)
        .bind(&tx.currency)
        .bind(&tx.country)
        .bind(tx.method.as_str())
        .bind(tx.status.as_str())
        .bind(&tx.customer.name)
        .bind(&tx.customer.email)
        .bind(&tx.customer.phone)
        .bind(&tx.checkout_url)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.last_verified_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateTxRef(tx.tx_ref.clone())
            }
            _ => backend(e),
        })?;

        row.into_domain()
    }

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE tx_ref = $1",
            TX_COLUMNS
        ))
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_by_provider_reference(
        &self,
        provider: &str,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE provider = $1 AND provider_reference = $2",
            TX_COLUMNS
        ))
        .bind(provider)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(TransactionRow::into_domain).transpose()
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

        let updated = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $2,
                provider_reference = COALESCE(provider_reference, $3),
                updated_at = NOW(),
                last_verified_at = NOW()
            WHERE tx_ref = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TX_COLUMNS
        ))
        .bind(tx_ref)
        .bind(to.as_str())
        .bind(provider_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        if let Some(row) = updated {
            return Ok(TransitionOutcome::Applied(row.into_domain()?));
        }

        // The conditional write missed: the row is already terminal (the
        // update observes committed state, so pending is impossible here).
        let current = self
            .get_by_tx_ref(tx_ref)
            .await?
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;

        if current.status == to {
            Ok(TransitionOutcome::Noop(current))
        } else {
            Ok(TransitionOutcome::Conflict(current))
        }
    }

    async fn touch_verified(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET last_verified_at = NOW(),
                provider_reference = COALESCE(provider_reference, $2)
            WHERE tx_ref = $1
            "#,
        )
        .bind(tx_ref)
        .bind(provider_reference)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(tx_ref.to_string()));
        }
        Ok(())
    }

    async fn attach_initiation(
        &self,
        tx_ref: &str,
        provider_reference: Option<&str>,
        checkout_url: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET provider_reference = COALESCE(provider_reference, $2),
                checkout_url = $3,
                updated_at = NOW()
            WHERE tx_ref = $1
            "#,
        )
        .bind(tx_ref)
        .bind(provider_reference)
        .bind(checkout_url)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(tx_ref.to_string()));
        }
        Ok(())
    }

    async fn stale_pending(
        &self,
        created_before: DateTime<Utc>,
        verified_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE status = 'pending'
              AND created_at < $1
              AND (last_verified_at IS NULL OR last_verified_at < $2)
            ORDER BY created_at ASC
            LIMIT $3
            "#,
            TX_COLUMNS
        ))
        .bind(created_before)
        .bind(verified_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn append_audit(
        &self,
        tx_ref: &str,
        stage: AuditStage,
        payload: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_audit (id, tx_ref, stage, payload, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tx_ref)
        .bind(stage.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn audit_trail(&self, tx_ref: &str) -> StoreResult<Vec<AuditEntry>> {
        let rows: Vec<(Uuid, String, String, serde_json::Value, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, tx_ref, stage, payload, created_at
                FROM transaction_audit
                WHERE tx_ref = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(tx_ref)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.into_iter()
            .map(|(id, tx_ref, stage, payload, created_at)| {
                let stage = match stage.as_str() {
                    "initiation_request" => AuditStage::InitiationRequest,
                    "initiation_response" => AuditStage::InitiationResponse,
                    "verification" => AuditStage::Verification,
                    "webhook" => AuditStage::Webhook,
                    other => return Err(StoreError::Corrupt(format!("audit stage {}", other))),
                };
                Ok(AuditEntry {
                    id,
                    tx_ref,
                    stage,
                    payload,
                    created_at,
                })
            })
            .collect()
    }

    async fn record_event(&self, event: &GatewayEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO gateway_events (id, tx_ref, provider, kind, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.tx_ref)
        .bind(&event.provider)
        .bind(event.kind.as_str())
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn recent_events(
        &self,
        kind: Option<EventKind>,
        limit: i64,
    ) -> StoreResult<Vec<GatewayEvent>> {
        let rows: Vec<(
            Uuid,
            Option<String>,
            String,
            String,
            serde_json::Value,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, tx_ref, provider, kind, detail, created_at
            FROM gateway_events
            WHERE ($1::text IS NULL OR kind = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|(id, tx_ref, provider, kind, detail, created_at)| {
                let kind = kind.parse().map_err(StoreError::Corrupt)?;
                Ok(GatewayEvent {
                    id,
                    tx_ref,
                    provider,
                    kind,
                    detail,
                    created_at,
                })
            })
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
