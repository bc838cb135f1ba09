//! Pending-approval state machine for APPROVAL-tier transactions.
//!
//! A row waits in PENDING_APPROVAL until the owner approves, rejects,
//! or the window closes. Approval is an expiry-checked conditional flip
//! to EXECUTING; the caller resumes the executor with the returned row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::domain::{Transaction, TxStatus};
use crate::error::{Result, WardenError};

/// Persistence surface of the approval machine. `PostgresStore`
/// implements it below; tests use an in-memory row.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn mark_pending_approval(&self, id: Uuid, expires_at_epoch: i64) -> Result<bool>;
    async fn approve_transaction(&self, id: Uuid, signature: &str, now_epoch: i64)
        -> Result<bool>;
    async fn mark_cancelled(&self, id: Uuid, expected: &[TxStatus], reason: &str) -> Result<bool>;
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn expire_stale_approvals(&self, now_epoch: i64) -> Result<Vec<Transaction>>;
}

#[async_trait]
impl ApprovalStore for PostgresStore {
    async fn mark_pending_approval(&self, id: Uuid, expires_at_epoch: i64) -> Result<bool> {
        self.mark_pending_approval(id, expires_at_epoch).await
    }
    async fn approve_transaction(
        &self,
        id: Uuid,
        signature: &str,
        now_epoch: i64,
    ) -> Result<bool> {
        self.approve_transaction(id, signature, now_epoch).await
    }
    async fn mark_cancelled(&self, id: Uuid, expected: &[TxStatus], reason: &str) -> Result<bool> {
        self.mark_cancelled(id, expected, reason).await
    }
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.get_transaction(id).await
    }
    async fn expire_stale_approvals(&self, now_epoch: i64) -> Result<Vec<Transaction>> {
        self.expire_stale_approvals(now_epoch).await
    }
}

#[derive(Clone)]
pub struct ApprovalWorkflow {
    store: Arc<dyn ApprovalStore>,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }

    /// PENDING -> PENDING_APPROVAL with expiry = now + timeout.
    pub async fn request_approval(
        &self,
        tx_id: Uuid,
        timeout_seconds: i64,
    ) -> Result<DateTime<Utc>> {
        let expires_at = Utc::now() + Duration::seconds(timeout_seconds);
        if !self
            .store
            .mark_pending_approval(tx_id, expires_at.timestamp())
            .await?
        {
            return Err(self.conflict(tx_id).await);
        }
        info!(tx_id = %tx_id, expires_at = %expires_at, "approval requested");
        Ok(expires_at)
    }

    /// Expiry-checked flip to EXECUTING. Records the owner signature
    /// and hands back the row for the caller to resume execution.
    pub async fn approve(&self, tx_id: Uuid, signature: &str) -> Result<Transaction> {
        if signature.trim().is_empty() {
            return Err(WardenError::Validation(
                "approval signature must not be empty".to_string(),
            ));
        }
        let now = Utc::now().timestamp();
        if self.store.approve_transaction(tx_id, signature, now).await? {
            let tx = self
                .store
                .get_transaction(tx_id)
                .await?
                .ok_or_else(|| WardenError::TransactionNotFound(tx_id.to_string()))?;
            info!(tx_id = %tx_id, "approval granted");
            return Ok(tx);
        }

        Err(match self.store.get_transaction(tx_id).await? {
            // Still PENDING_APPROVAL yet not approvable: the window has
            // closed. The sweeper will flip the row to EXPIRED shortly.
            Some(tx) if tx.status == TxStatus::PendingApproval => WardenError::TxAlreadyProcessed {
                tx_id: tx_id.to_string(),
                status: TxStatus::Expired.to_string(),
            },
            Some(tx) => WardenError::TxAlreadyProcessed {
                tx_id: tx_id.to_string(),
                status: tx.status.to_string(),
            },
            None => WardenError::TransactionNotFound(tx_id.to_string()),
        })
    }

    /// Owner rejection: PENDING_APPROVAL -> CANCELLED, reservation
    /// released by the same statement.
    pub async fn reject(&self, tx_id: Uuid, reason: &str) -> Result<()> {
        if !self
            .store
            .mark_cancelled(tx_id, &[TxStatus::PendingApproval], reason)
            .await?
        {
            return Err(self.conflict(tx_id).await);
        }
        info!(tx_id = %tx_id, "approval rejected");
        Ok(())
    }

    /// Sweep rows whose window elapsed to EXPIRED. Returns only the
    /// rows this call flipped.
    pub async fn process_expired_approvals(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let expired = self.store.expire_stale_approvals(now.timestamp()).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired stale approvals");
        }
        Ok(expired)
    }

    async fn conflict(&self, tx_id: Uuid) -> WardenError {
        match self.store.get_transaction(tx_id).await {
            Ok(Some(tx)) => WardenError::TxAlreadyProcessed {
                tx_id: tx_id.to_string(),
                status: tx.status.to_string(),
            },
            Ok(None) => WardenError::TransactionNotFound(tx_id.to_string()),
            Err(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainKind, Tier, TxKind, TxMetadata};
    use std::sync::Mutex;

    /// Single-row store applying the same conditional guards the SQL
    /// statements do.
    struct MemoryStore {
        row: Mutex<Option<Transaction>>,
    }

    impl MemoryStore {
        fn with(tx: Transaction) -> Self {
            Self {
                row: Mutex::new(Some(tx)),
            }
        }

        fn empty() -> Self {
            Self {
                row: Mutex::new(None),
            }
        }

        fn status(&self) -> Option<TxStatus> {
            self.row.lock().unwrap().as_ref().map(|t| t.status)
        }
    }

    #[async_trait]
    impl ApprovalStore for MemoryStore {
        async fn mark_pending_approval(&self, id: Uuid, expires_at_epoch: i64) -> Result<bool> {
            let mut guard = self.row.lock().unwrap();
            Ok(match guard.as_mut() {
                Some(tx) if tx.id == id && tx.status == TxStatus::Pending => {
                    tx.status = TxStatus::PendingApproval;
                    tx.metadata.approval_expires_at = Some(expires_at_epoch);
                    true
                }
                _ => false,
            })
        }

        async fn approve_transaction(
            &self,
            id: Uuid,
            signature: &str,
            now_epoch: i64,
        ) -> Result<bool> {
            let mut guard = self.row.lock().unwrap();
            Ok(match guard.as_mut() {
                Some(tx)
                    if tx.id == id
                        && tx.status == TxStatus::PendingApproval
                        && tx.metadata.approval_expires_at.unwrap_or(0) > now_epoch =>
                {
                    tx.status = TxStatus::Executing;
                    tx.metadata.owner_signature = Some(signature.to_string());
                    true
                }
                _ => false,
            })
        }

        async fn mark_cancelled(
            &self,
            id: Uuid,
            expected: &[TxStatus],
            reason: &str,
        ) -> Result<bool> {
            let mut guard = self.row.lock().unwrap();
            Ok(match guard.as_mut() {
                Some(tx) if tx.id == id && expected.contains(&tx.status) => {
                    tx.status = TxStatus::Cancelled;
                    tx.error_message = Some(reason.to_string());
                    tx.reserved_amount = None;
                    true
                }
                _ => false,
            })
        }

        async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
            Ok(self.row.lock().unwrap().clone().filter(|t| t.id == id))
        }

        async fn expire_stale_approvals(&self, now_epoch: i64) -> Result<Vec<Transaction>> {
            let mut guard = self.row.lock().unwrap();
            Ok(match guard.as_mut() {
                Some(tx)
                    if tx.status == TxStatus::PendingApproval
                        && tx.metadata.approval_expires_at.unwrap_or(0) <= now_epoch =>
                {
                    tx.status = TxStatus::Expired;
                    tx.reserved_amount = None;
                    vec![tx.clone()]
                }
                _ => vec![],
            })
        }
    }

    fn pending_tx() -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            session_id: None,
            kind: TxKind::Transfer,
            status: TxStatus::Pending,
            tier: Some(Tier::Approval),
            chain: ChainKind::Solana,
            network: None,
            from_address: "from".to_string(),
            to_address: "to".to_string(),
            amount: "100".to_string(),
            amount_usd: None,
            tx_hash: None,
            error_message: None,
            reserved_amount: None,
            metadata: TxMetadata::default(),
            queued_at: None,
            executed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn workflow(store: Arc<MemoryStore>) -> ApprovalWorkflow {
        ApprovalWorkflow::new(store)
    }

    #[tokio::test]
    async fn test_request_then_approve_hands_back_executing_row() {
        let tx = pending_tx();
        let tx_id = tx.id;
        let store = Arc::new(MemoryStore::with(tx));
        let wf = workflow(store.clone());

        let expires_at = wf.request_approval(tx_id, 3600).await.unwrap();
        assert!(expires_at > Utc::now());
        assert_eq!(store.status(), Some(TxStatus::PendingApproval));

        let approved = wf.approve(tx_id, "0xsig").await.unwrap();
        assert_eq!(approved.status, TxStatus::Executing);
        assert_eq!(approved.metadata.owner_signature.as_deref(), Some("0xsig"));
    }

    #[tokio::test]
    async fn test_approve_after_window_reports_expired() {
        let mut tx = pending_tx();
        tx.status = TxStatus::PendingApproval;
        tx.metadata.approval_expires_at = Some(Utc::now().timestamp() - 10);
        let tx_id = tx.id;
        let store = Arc::new(MemoryStore::with(tx));
        let wf = workflow(store.clone());

        let err = wf.approve(tx_id, "0xsig").await.unwrap_err();
        match err {
            WardenError::TxAlreadyProcessed { status, .. } => assert_eq!(status, "EXPIRED"),
            other => panic!("expected state conflict, got {other:?}"),
        }
        // The row itself is the sweeper's to flip.
        assert_eq!(store.status(), Some(TxStatus::PendingApproval));
    }

    #[tokio::test]
    async fn test_approve_conflicts_outside_pending_approval() {
        let mut tx = pending_tx();
        tx.status = TxStatus::Executing;
        let tx_id = tx.id;
        let wf = workflow(Arc::new(MemoryStore::with(tx)));

        let err = wf.approve(tx_id, "0xsig").await.unwrap_err();
        match err {
            WardenError::TxAlreadyProcessed { status, .. } => assert_eq!(status, "EXECUTING"),
            other => panic!("expected state conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_signature_rejected_up_front() {
        let tx = pending_tx();
        let tx_id = tx.id;
        let wf = workflow(Arc::new(MemoryStore::with(tx)));
        let err = wf.approve(tx_id, "  ").await.unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reject_only_from_pending_approval() {
        let mut tx = pending_tx();
        tx.status = TxStatus::PendingApproval;
        tx.metadata.approval_expires_at = Some(Utc::now().timestamp() + 600);
        let tx_id = tx.id;
        let store = Arc::new(MemoryStore::with(tx));
        let wf = workflow(store.clone());

        wf.reject(tx_id, "owner rejected").await.unwrap();
        assert_eq!(store.status(), Some(TxStatus::Cancelled));

        // A second reject hits the terminal row.
        let err = wf.reject(tx_id, "again").await.unwrap_err();
        assert!(matches!(err, WardenError::TxAlreadyProcessed { .. }));
    }

    #[tokio::test]
    async fn test_expiry_sweep_returns_each_row_once() {
        let mut tx = pending_tx();
        tx.status = TxStatus::PendingApproval;
        tx.metadata.approval_expires_at = Some(Utc::now().timestamp() - 5);
        let store = Arc::new(MemoryStore::with(tx));
        let wf = workflow(store.clone());

        let swept = wf.process_expired_approvals(Utc::now()).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, TxStatus::Expired);
        assert!(swept[0].reserved_amount.is_none());

        let again = wf.process_expired_approvals(Utc::now()).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let wf = workflow(Arc::new(MemoryStore::empty()));
        let err = wf.request_approval(Uuid::new_v4(), 3600).await.unwrap_err();
        assert!(matches!(err, WardenError::TransactionNotFound(_)));
    }
}
