//! Reconciliation loop.
//!
//! Providers drop webhooks. The reconciler re-verifies every transaction
//! stuck in pending past a grace period, which makes the engine eventually
//! consistent even with an unreliable push channel. Transitions are the
//! store's atomic compare-and-set, so running concurrently with webhook
//! delivery for the same transaction is safe by construction.

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::Config;
use crate::services::OrchestrationService;
use crate::store::TransactionStore;

pub struct Reconciler {
    orchestrator: Arc<OrchestrationService>,
    store: Arc<dyn TransactionStore>,
    interval_secs: u64,
    grace_secs: i64,
    batch_size: i64,
    concurrency: usize,
    max_age_hours: i64,
}

impl Reconciler {
    pub fn new(
        orchestrator: Arc<OrchestrationService>,
        store: Arc<dyn TransactionStore>,
        config: &Config,
    ) -> Self {
        Self {
            orchestrator,
            store,
            interval_secs: config.reconcile_interval_secs,
            grace_secs: config.reconcile_grace_secs,
            batch_size: config.reconcile_batch_size,
            concurrency: config.reconcile_concurrency.max(1),
            max_age_hours: config.pending_max_age_hours,
        }
    }

    /// Runs until the shutdown channel flips. In-flight per-transaction
    /// verifications finish before the loop exits; each transition is a
    /// single atomic write, so shutdown never leaves a row half-moved.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval_secs, "reconciler started");
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(checked = n, "reconciliation pass complete"),
                        Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass. Returns the number of transactions checked.
    /// Failures are isolated per transaction: one provider being down never
    /// blocks verification of transactions belonging to other providers.
    pub async fn run_once(&self) -> Result<usize, crate::store::StoreError> {
        let now = Utc::now();
        let created_before = now - ChronoDuration::seconds(self.grace_secs);
        // last_verified_at doubles as the per-transaction cooldown: a row
        // verified within the current interval is skipped, so overlapping
        // passes do not hammer the same transaction.
        let verified_before = now - ChronoDuration::seconds(self.interval_secs as i64);
        let expiry = now - ChronoDuration::hours(self.max_age_hours);

        let batch = self
            .store
            .stale_pending(created_before, verified_before, self.batch_size)
            .await?;
        let count = batch.len();

        stream::iter(batch)
            .for_each_concurrent(self.concurrency, |tx| {
                let orchestrator = Arc::clone(&self.orchestrator);
                async move {
                    if tx.created_at < expiry {
                        if let Err(e) = orchestrator.fail_unreachable(&tx).await {
                            tracing::error!(tx_ref = %tx.tx_ref, error = %e, "expiry escalation failed");
                        }
                        return;
                    }
                    match orchestrator.verify_payment(&tx.tx_ref).await {
                        Ok(result) if result.transaction.status.is_terminal() => {
                            tracing::info!(
                                tx_ref = %tx.tx_ref,
                                status = %result.transaction.status,
                                "reconciled to terminal state"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(tx_ref = %tx.tx_ref, error = %e, "reconcile verify failed");
                        }
                    }
                }
            })
            .await;

        Ok(count)
    }
}
