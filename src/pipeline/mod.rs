//! The authorization pipeline.
//!
//! Every submission walks the same five stages: kill-switch gate,
//! request validation, USD resolution, policy evaluation with budget
//! reservation, then tier dispatch. INSTANT and NOTIFY run inline;
//! DELAY and APPROVAL park the row and hand it back to the sweepers.
//! A row that leaves `submit` is either terminal or parked, never
//! half-dispatched.

pub mod executor;
pub mod resolve;

pub use executor::{ExecutionReceipt, Executor, ExecutorStore, Sleeper, TokioSleeper};
pub use resolve::{AmountResolver, Resolution};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::domain::{
    AuditSeverity, Tier, Transaction, TransactionRequest, TxMetadata, TxStatus, Wallet,
    WalletStatus,
};
use crate::error::{Result, WardenError};
use crate::policy::{PolicyDecision, PolicyEngine};
use crate::services::notifier::{events, Notifier};
use crate::validation::validate_request;
use crate::workflow::{ApprovalWorkflow, DelayQueue};

/// Caller-facing outcome of a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// INSTANT and NOTIFY: executed inline, confirmed on chain.
    Confirmed {
        tx_id: Uuid,
        tier: Tier,
        tx_hash: String,
        confirmations: u32,
        fee: Option<Decimal>,
    },
    /// DELAY: parked in the cooldown queue until `expires_at`.
    Queued {
        tx_id: Uuid,
        tier: Tier,
        expires_at: DateTime<Utc>,
    },
    /// APPROVAL: waiting on the owner until `expires_at`.
    PendingApproval {
        tx_id: Uuid,
        tier: Tier,
        expires_at: DateTime<Utc>,
    },
}

pub struct Pipeline {
    store: PostgresStore,
    resolver: AmountResolver,
    policy: PolicyEngine,
    executor: Arc<Executor>,
    delay_queue: DelayQueue,
    approval: ApprovalWorkflow,
    notifier: Notifier,
}

impl Pipeline {
    pub fn new(
        store: PostgresStore,
        resolver: AmountResolver,
        policy: PolicyEngine,
        executor: Arc<Executor>,
        delay_queue: DelayQueue,
        approval: ApprovalWorkflow,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            resolver,
            policy,
            executor,
            delay_queue,
            approval,
            notifier,
        }
    }

    /// Authorize and dispatch one transaction request.
    #[instrument(skip(self, request), fields(wallet_id = %wallet_id))]
    pub async fn submit(
        &self,
        wallet_id: Uuid,
        session_id: Option<Uuid>,
        request: TransactionRequest,
    ) -> Result<SubmitOutcome> {
        self.guard_kill_switch().await?;

        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WardenError::WalletNotFound(wallet_id.to_string()))?;
        if wallet.status != WalletStatus::Active {
            return Err(WardenError::WalletSuspended(wallet_id.to_string()));
        }

        // Synchronous validation rejects before anything is persisted.
        validate_request(&request, wallet.chain)?;

        let tx = self.insert_pending(&wallet, session_id, &request).await?;

        let (usd_amount, is_stale) = match self
            .resolver
            .resolve(&request, wallet.chain, wallet.network.as_deref())
            .await?
        {
            Resolution::Resolved {
                usd_amount,
                is_stale,
            } => (usd_amount, is_stale),
            Resolution::OracleDown { detail } => {
                let err = WardenError::OracleUnavailable(detail);
                self.store.mark_failed(tx.id, &err.to_string()).await?;
                return Err(err);
            }
            Resolution::NotListed {
                token_address,
                chain,
                ..
            } => {
                let err = WardenError::TokenNotListed {
                    token: token_address,
                    chain: chain.to_string(),
                };
                self.store.mark_failed(tx.id, &err.to_string()).await?;
                return Err(err);
            }
        };
        self.store
            .update_resolution(tx.id, usd_amount, is_stale)
            .await?;

        let decision = match self
            .policy
            .evaluate_and_reserve(&wallet, tx.id, &request, usd_amount, is_stale)
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                // A deterministic deny fails the row; infrastructure
                // errors leave it PENDING for the restart sweep.
                if let WardenError::PolicyDenied { reason } = &err {
                    self.store.mark_failed(tx.id, &err.to_string()).await?;
                    self.store
                        .append_audit(
                            events::POLICY_DENIED,
                            AuditSeverity::Warning,
                            Some(wallet.id),
                            Some(tx.id),
                            json!({ "reason": reason }),
                        )
                        .await?;
                }
                return Err(err);
            }
        };

        if decision.downgraded {
            self.store
                .append_audit(
                    events::TX_DOWNGRADED_DELAY,
                    AuditSeverity::Warning,
                    Some(wallet.id),
                    Some(tx.id),
                    json!({ "from": Tier::Approval, "to": decision.tier }),
                )
                .await?;
            self.notifier.notify(
                events::TX_DOWNGRADED_DELAY,
                Some(wallet.id),
                Some(tx.id),
                "no owner connected; approval demoted to a delay window",
            );
        }

        self.dispatch(&wallet, &tx, &request, &decision).await
    }

    /// Drive an already promoted row to a terminal status. The delay
    /// sweeper and the approve path both hand rows here after their
    /// flip to EXECUTING.
    pub async fn resume(&self, tx: &Transaction) -> Result<ExecutionReceipt> {
        self.guard_kill_switch().await?;
        let wallet = self
            .store
            .get_wallet(tx.wallet_id)
            .await?
            .ok_or_else(|| WardenError::WalletNotFound(tx.wallet_id.to_string()))?;
        let request = tx.metadata.request.clone().ok_or_else(|| {
            WardenError::Internal(format!("transaction {} has no stored request", tx.id))
        })?;
        self.execute_and_notify(&wallet, tx.id, &request).await
    }

    /// Owner approval. The workflow CAS hands back the EXECUTING row,
    /// which then runs inline on the caller.
    pub async fn approve(&self, tx_id: Uuid, signature: &str) -> Result<SubmitOutcome> {
        self.guard_kill_switch().await?;
        let tx = self.approval.approve(tx_id, signature).await?;
        self.store
            .append_audit(
                events::APPROVAL_GRANTED,
                AuditSeverity::Info,
                Some(tx.wallet_id),
                Some(tx.id),
                json!({ "signature": signature }),
            )
            .await?;
        let receipt = self.resume(&tx).await?;
        Ok(SubmitOutcome::Confirmed {
            tx_id: tx.id,
            tier: tx.tier.unwrap_or(Tier::Approval),
            tx_hash: receipt.tx_hash,
            confirmations: receipt.confirmations,
            fee: receipt.fee,
        })
    }

    /// Owner rejection of a PENDING_APPROVAL row.
    pub async fn reject(&self, tx_id: Uuid, reason: &str) -> Result<()> {
        let tx = self.require_tx(tx_id).await?;
        self.approval.reject(tx_id, reason).await?;
        self.notifier.notify(
            events::TX_CANCELLED,
            Some(tx.wallet_id),
            Some(tx_id),
            format!("approval rejected: {}", reason),
        );
        Ok(())
    }

    /// Cancel a QUEUED row before its cooldown elapses.
    pub async fn cancel_delayed(&self, tx_id: Uuid, reason: &str) -> Result<()> {
        let tx = self.require_tx(tx_id).await?;
        self.delay_queue.cancel_delay(tx_id, reason).await?;
        self.notifier.notify(
            events::TX_CANCELLED,
            Some(tx.wallet_id),
            Some(tx_id),
            format!("delay cancelled: {}", reason),
        );
        Ok(())
    }

    async fn dispatch(
        &self,
        wallet: &Wallet,
        tx: &Transaction,
        request: &TransactionRequest,
        decision: &PolicyDecision,
    ) -> Result<SubmitOutcome> {
        match decision.tier {
            Tier::Instant => self.run_now(wallet, tx.id, decision.tier, request).await,
            Tier::Notify => {
                self.notifier.notify(
                    events::TX_SUBMITTED,
                    Some(wallet.id),
                    Some(tx.id),
                    format!("transaction {} executing under NOTIFY", tx.id),
                );
                self.run_now(wallet, tx.id, decision.tier, request).await
            }
            Tier::Delay => {
                let window = self
                    .delay_queue
                    .queue_delay(tx.id, decision.delay_seconds)
                    .await?;
                self.notifier.notify(
                    events::TX_QUEUED,
                    Some(wallet.id),
                    Some(tx.id),
                    format!("queued for {}s cooldown", decision.delay_seconds),
                );
                Ok(SubmitOutcome::Queued {
                    tx_id: tx.id,
                    tier: decision.tier,
                    expires_at: window.expires_at,
                })
            }
            Tier::Approval => {
                let expires_at = self
                    .approval
                    .request_approval(tx.id, decision.approval_timeout_seconds)
                    .await?;
                self.notifier.notify(
                    events::APPROVAL_REQUESTED,
                    Some(wallet.id),
                    Some(tx.id),
                    format!("owner approval required before {}", expires_at),
                );
                Ok(SubmitOutcome::PendingApproval {
                    tx_id: tx.id,
                    tier: decision.tier,
                    expires_at,
                })
            }
        }
    }

    /// Inline execution for INSTANT and NOTIFY.
    async fn run_now(
        &self,
        wallet: &Wallet,
        tx_id: Uuid,
        tier: Tier,
        request: &TransactionRequest,
    ) -> Result<SubmitOutcome> {
        if !self.store.mark_executing(tx_id).await? {
            return Err(self.store.status_conflict(tx_id).await);
        }
        let receipt = self.execute_and_notify(wallet, tx_id, request).await?;
        Ok(SubmitOutcome::Confirmed {
            tx_id,
            tier,
            tx_hash: receipt.tx_hash,
            confirmations: receipt.confirmations,
            fee: receipt.fee,
        })
    }

    async fn execute_and_notify(
        &self,
        wallet: &Wallet,
        tx_id: Uuid,
        request: &TransactionRequest,
    ) -> Result<ExecutionReceipt> {
        match self.executor.execute(tx_id, wallet, request).await {
            Ok(receipt) => {
                self.notifier.notify(
                    events::TX_CONFIRMED,
                    Some(wallet.id),
                    Some(tx_id),
                    format!("confirmed as {}", receipt.tx_hash),
                );
                Ok(receipt)
            }
            Err(err) => {
                self.notifier.notify(
                    events::TX_FAILED,
                    Some(wallet.id),
                    Some(tx_id),
                    err.to_string(),
                );
                Err(err)
            }
        }
    }

    async fn insert_pending(
        &self,
        wallet: &Wallet,
        session_id: Option<Uuid>,
        request: &TransactionRequest,
    ) -> Result<Transaction> {
        let now = Utc::now();
        let tx = Transaction {
            // v7 so transaction ids sort by creation time.
            id: Uuid::now_v7(),
            wallet_id: wallet.id,
            session_id,
            kind: request.kind(),
            status: TxStatus::Pending,
            tier: None,
            chain: wallet.chain,
            network: wallet.network.clone(),
            from_address: wallet.public_key.clone(),
            to_address: request.destination().unwrap_or_default().to_string(),
            amount: request.amount().to_string(),
            amount_usd: None,
            tx_hash: None,
            error_message: None,
            reserved_amount: None,
            // The stored request is what resumed rows rebuild from.
            metadata: TxMetadata {
                request: Some(request.clone()),
                ..Default::default()
            },
            queued_at: None,
            executed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_transaction(&tx).await?;
        Ok(tx)
    }

    async fn require_tx(&self, tx_id: Uuid) -> Result<Transaction> {
        self.store
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| WardenError::TransactionNotFound(tx_id.to_string()))
    }

    async fn guard_kill_switch(&self) -> Result<()> {
        let switch = self.store.get_kill_switch().await?;
        if switch.state.is_engaged() {
            return Err(WardenError::KillSwitchEngaged {
                state: switch.state.to_string(),
            });
        }
        Ok(())
    }
}
