//! Cooldown state machine for DELAY-tier transactions.
//!
//! A queued row sits in QUEUED until its cooldown elapses; the sweeper
//! then promotes it to EXECUTING through a conditional update, so a row
//! is handed to the executor exactly once no matter how many tickers
//! overlap.

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::domain::{Transaction, TxStatus};
use crate::error::{Result, WardenError};

/// Cooldown window handed back to the caller on queue.
#[derive(Debug, Clone, Copy)]
pub struct DelayWindow {
    pub queued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DelayQueue {
    store: PostgresStore,
}

impl DelayQueue {
    pub fn new(store: PostgresStore) -> Self {
        Self { store }
    }

    /// PENDING -> QUEUED with the cooldown stamped on the row.
    pub async fn queue_delay(&self, tx_id: Uuid, delay_seconds: i64) -> Result<DelayWindow> {
        let queued_at = Utc::now();
        if !self
            .store
            .mark_queued(tx_id, queued_at, delay_seconds)
            .await?
        {
            return Err(self.store.status_conflict(tx_id).await);
        }
        info!(tx_id = %tx_id, delay_seconds, "transaction queued for cooldown");
        Ok(DelayWindow {
            queued_at,
            expires_at: queued_at + Duration::seconds(delay_seconds),
        })
    }

    /// Owner-triggered cancel. Legal only while QUEUED; the conditional
    /// update releases the budget reservation with the same statement.
    pub async fn cancel_delay(&self, tx_id: Uuid, reason: &str) -> Result<()> {
        if !self
            .store
            .mark_cancelled(tx_id, &[TxStatus::Queued], reason)
            .await?
        {
            return Err(self.store.status_conflict(tx_id).await);
        }
        info!(tx_id = %tx_id, "queued transaction cancelled");
        Ok(())
    }

    /// Flip every QUEUED row past its expiry to EXECUTING. Only rows
    /// this call actually flipped come back, so overlapping ticks never
    /// hand the same row to two executors.
    pub async fn process_expired(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let promoted = self.store.promote_expired_delays(now).await?;
        if !promoted.is_empty() {
            info!(count = promoted.len(), "promoted expired delay rows");
        }
        Ok(promoted)
    }

    /// Read-only check: has the cooldown elapsed? A row that was never
    /// queued has no cooldown and reports false.
    pub async fn is_expired(&self, tx_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let tx = self
            .store
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| WardenError::TransactionNotFound(tx_id.to_string()))?;
        Ok(tx.delay_expires_at().is_some_and(|expires| expires <= now))
    }
}
