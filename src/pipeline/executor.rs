//! Adapter-routed execution with category-based retry.
//!
//! One attempt is the sequence build, simulate, sign, submit and
//! wait_for_confirmation. Failures before a successful submit are
//! retried by their category: TRANSIENT reuses the built artifact with
//! exponential backoff, STALE throws the artifact away and rebuilds,
//! PERMANENT fails on the spot. After a successful submit nothing is
//! ever retried; resubmitting a landed transaction could duplicate it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::chain::{
    AdapterRegistry, BuiltTx, ChainAdapter, ChainError, ChainErrorCode, ConfirmationStatus,
    ErrorCategory, KeyProvider, SubmitReceipt,
};
use crate::domain::{TransactionRequest, Wallet};
use crate::error::{Result, WardenError};

/// Total attempts allowed when every failure is TRANSIENT.
const MAX_TRANSIENT_ATTEMPTS: u32 = 3;
/// Rebuilds allowed for STALE failures.
const MAX_REBUILDS: u32 = 1;

/// Backoff before TRANSIENT retry n (0-based): 1s, 2s, 4s, capped.
fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(1u64 << retry.min(4))
}

/// Injectable sleep so retry tests run without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Persistence surface the executor needs. `PostgresStore` implements
/// this below; tests swap in an in-memory recorder.
#[async_trait]
pub trait ExecutorStore: Send + Sync {
    async fn mark_submitted(&self, id: Uuid, tx_hash: &str) -> Result<bool>;
    async fn mark_confirmed(&self, id: Uuid, details: serde_json::Value) -> Result<bool>;
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool>;
    async fn increment_retry_count(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
impl ExecutorStore for crate::adapters::PostgresStore {
    async fn mark_submitted(&self, id: Uuid, tx_hash: &str) -> Result<bool> {
        self.mark_submitted(id, tx_hash).await
    }
    async fn mark_confirmed(&self, id: Uuid, details: serde_json::Value) -> Result<bool> {
        self.mark_confirmed(id, details).await
    }
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool> {
        self.mark_failed(id, error_message).await
    }
    async fn increment_retry_count(&self, id: Uuid) -> Result<()> {
        self.increment_retry_count(id).await
    }
}

/// Terminal outcome of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub tx_hash: String,
    pub confirmations: u32,
    pub fee: Option<Decimal>,
}

/// Where in the attempt a failure happened. Only pre-submit failures
/// ever reach the retry machine.
enum AttemptError {
    BeforeSubmit(WardenError),
    /// Already recorded as FAILED; the transaction may be on the wire.
    AfterSubmit(WardenError),
}

pub struct Executor {
    store: Arc<dyn ExecutorStore>,
    registry: Arc<AdapterRegistry>,
    keys: Arc<dyn KeyProvider>,
    sleeper: Arc<dyn Sleeper>,
    confirmation_timeout: Duration,
}

impl Executor {
    pub fn new(
        store: Arc<dyn ExecutorStore>,
        registry: Arc<AdapterRegistry>,
        keys: Arc<dyn KeyProvider>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            keys,
            sleeper: Arc::new(TokioSleeper),
            confirmation_timeout,
        }
    }

    /// Swap the sleeper. Tests use this to collect backoff delays
    /// instead of waiting them out.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run a transaction to a terminal status. The row must already be
    /// EXECUTING; every transition from there is owned here.
    #[instrument(skip(self, wallet, request), fields(tx_id = %tx_id, chain = %wallet.chain))]
    pub async fn execute(
        &self,
        tx_id: Uuid,
        wallet: &Wallet,
        request: &TransactionRequest,
    ) -> Result<ExecutionReceipt> {
        // A missing adapter is terminal for the row, not just for this
        // attempt; leaving it EXECUTING would strand the budget hold
        // until the next restart sweep.
        let adapter = match self.registry.get(wallet.chain) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.store.mark_failed(tx_id, &err.to_string()).await?;
                return Err(err);
            }
        };

        let mut artifact: Option<BuiltTx> = None;
        let mut transient_failures = 0u32;
        let mut rebuilds = 0u32;

        loop {
            match self
                .attempt(adapter.as_ref(), tx_id, wallet, request, &mut artifact)
                .await
            {
                Ok(receipt) => {
                    info!(tx_hash = %receipt.tx_hash, "transaction confirmed");
                    return Ok(receipt);
                }
                Err(AttemptError::AfterSubmit(e)) => return Err(e),
                Err(AttemptError::BeforeSubmit(WardenError::Chain(chain_err))) => {
                    match chain_err.category() {
                        ErrorCategory::Permanent => {
                            return self.fail(tx_id, chain_err).await;
                        }
                        ErrorCategory::Transient => {
                            transient_failures += 1;
                            self.store.increment_retry_count(tx_id).await?;
                            if transient_failures >= MAX_TRANSIENT_ATTEMPTS {
                                warn!(attempts = transient_failures, "transient retries exhausted");
                                return self.fail(tx_id, chain_err).await;
                            }
                            let delay = backoff_delay(transient_failures - 1);
                            warn!(
                                code = %chain_err.code,
                                attempt = transient_failures,
                                delay_secs = delay.as_secs(),
                                "transient chain error, backing off"
                            );
                            self.sleeper.sleep(delay).await;
                        }
                        ErrorCategory::Stale => {
                            self.store.increment_retry_count(tx_id).await?;
                            if rebuilds >= MAX_REBUILDS {
                                warn!(code = %chain_err.code, "stale rebuild already spent");
                                return self.fail(tx_id, chain_err).await;
                            }
                            rebuilds += 1;
                            warn!(code = %chain_err.code, "stale artifact, rebuilding");
                            artifact = None;
                        }
                    }
                }
                // Key or database failures have no chain category and
                // no meaningful retry.
                Err(AttemptError::BeforeSubmit(other)) => {
                    if !self.store.mark_failed(tx_id, &other.to_string()).await? {
                        warn!("transaction left its executing state before failure recorded");
                    }
                    return Err(other);
                }
            }
        }
    }

    async fn attempt(
        &self,
        adapter: &dyn ChainAdapter,
        tx_id: Uuid,
        wallet: &Wallet,
        request: &TransactionRequest,
        artifact: &mut Option<BuiltTx>,
    ) -> std::result::Result<ExecutionReceipt, AttemptError> {
        use AttemptError::{AfterSubmit, BeforeSubmit};

        if artifact.is_none() {
            let built = route_build(adapter, &wallet.public_key, request)
                .await
                .map_err(|e| BeforeSubmit(e.into()))?;
            *artifact = Some(built);
        }
        let built = artifact
            .as_ref()
            .ok_or_else(|| BeforeSubmit(WardenError::Internal("built artifact missing".into())))?;

        let simulation = adapter
            .simulate(built)
            .await
            .map_err(|e| BeforeSubmit(e.into()))?;
        if !simulation.success {
            // A clean `false` is a deterministic on-chain outcome, not
            // an infrastructure hiccup.
            return Err(BeforeSubmit(
                ChainError::new(
                    ChainErrorCode::ContractExecutionFailed,
                    wallet.chain.as_str(),
                    format!("simulation failed: {}", simulation.logs.join("; ")),
                )
                .into(),
            ));
        }

        // The key must not outlive the sign call.
        let signed = {
            let key = self
                .keys
                .signing_key(wallet.id)
                .await
                .map_err(BeforeSubmit)?;
            adapter
                .sign(built, &key)
                .await
                .map_err(|e| BeforeSubmit(e.into()))?
        };

        let receipt = adapter
            .submit(&signed)
            .await
            .map_err(|e| BeforeSubmit(e.into()))?;

        // The transaction is on the wire now. Everything below is
        // terminal on failure so the retry machine can never resubmit.
        self.confirm(adapter, tx_id, wallet, receipt)
            .await
            .map_err(AfterSubmit)
    }

    async fn confirm(
        &self,
        adapter: &dyn ChainAdapter,
        tx_id: Uuid,
        wallet: &Wallet,
        receipt: SubmitReceipt,
    ) -> Result<ExecutionReceipt> {
        if !self.store.mark_submitted(tx_id, &receipt.tx_hash).await? {
            warn!(tx_hash = %receipt.tx_hash, "submitted row was no longer executing");
        }

        let confirmation = match adapter
            .wait_for_confirmation(&receipt.tx_hash, self.confirmation_timeout)
            .await
        {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(tx_hash = %receipt.tx_hash, error = %e, "confirmation failed");
                self.store.mark_failed(tx_id, &e.to_string()).await?;
                return Err(e.into());
            }
        };
        if confirmation.status == ConfirmationStatus::Failed {
            let err = ChainError::new(
                ChainErrorCode::ContractExecutionFailed,
                wallet.chain.as_str(),
                "transaction failed on chain",
            );
            warn!(tx_hash = %receipt.tx_hash, "transaction reverted on chain");
            self.store.mark_failed(tx_id, &err.to_string()).await?;
            return Err(err.into());
        }

        let details = json!({
            "confirmations": confirmation.confirmations,
            "fee": confirmation.fee,
        });
        if !self.store.mark_confirmed(tx_id, details).await? {
            warn!(tx_hash = %receipt.tx_hash, "confirmed row was not in submitted state");
        }

        Ok(ExecutionReceipt {
            tx_hash: receipt.tx_hash,
            confirmations: confirmation.confirmations,
            fee: confirmation.fee,
        })
    }

    /// Persist FAILED and surface the categorized error.
    async fn fail(&self, tx_id: Uuid, chain_err: ChainError) -> Result<ExecutionReceipt> {
        warn!(code = %chain_err.code, error = %chain_err, "execution failed");
        if !self
            .store
            .mark_failed(tx_id, &chain_err.to_string())
            .await?
        {
            warn!("transaction left its executing state before failure recorded");
        }
        Err(chain_err.into())
    }
}

/// The 5-shape routing table: one request variant, one build call.
async fn route_build(
    adapter: &dyn ChainAdapter,
    from: &str,
    request: &TransactionRequest,
) -> crate::chain::ChainResult<BuiltTx> {
    match request {
        TransactionRequest::Transfer(r) => adapter.build_transfer(from, r).await,
        TransactionRequest::TokenTransfer(r) => adapter.build_token_transfer(from, r).await,
        TransactionRequest::ContractCall(r) => adapter.build_contract_call(from, r).await,
        TransactionRequest::Approve(r) => adapter.build_approve(from, r).await,
        TransactionRequest::Batch(r) => adapter.build_batch(from, r).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BalanceInfo, ChainResult, Confirmation, Simulation};
    use crate::domain::{ChainKind, TransferRequest, WalletStatus};
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use zeroize::Zeroizing;

    /// Everything succeeds unless a script says otherwise. Scripts are
    /// per-call outcome queues; an exhausted queue means success.
    #[derive(Default)]
    struct ScriptedAdapter {
        build_calls: AtomicU32,
        simulate_calls: AtomicU32,
        submit_calls: AtomicU32,
        confirm_calls: AtomicU32,
        simulate_clean_false: AtomicBool,
        submit_script: Mutex<VecDeque<ChainErrorCode>>,
        confirm_script: Mutex<VecDeque<ChainErrorCode>>,
        confirm_reverts: AtomicBool,
    }

    impl ScriptedAdapter {
        fn submit_fails_with(codes: &[ChainErrorCode]) -> Self {
            Self {
                submit_script: Mutex::new(codes.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn err(&self, code: ChainErrorCode) -> ChainError {
            ChainError::new(code, "solana", "scripted failure")
        }
    }

    #[async_trait]
    impl ChainAdapter for ScriptedAdapter {
        fn chain(&self) -> ChainKind {
            ChainKind::Solana
        }

        async fn connect(&self) -> ChainResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> ChainResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn get_balance(&self, _address: &str) -> ChainResult<BalanceInfo> {
            Ok(BalanceInfo {
                amount: "0".to_string(),
                decimals: 9,
                symbol: None,
            })
        }

        async fn build_transfer(
            &self,
            _from: &str,
            _request: &TransferRequest,
        ) -> ChainResult<BuiltTx> {
            self.build_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BuiltTx {
                serialized: vec![1, 2, 3],
                estimated_fee: None,
                metadata: json!({}),
            })
        }

        async fn build_token_transfer(
            &self,
            _from: &str,
            _request: &crate::domain::TokenTransferRequest,
        ) -> ChainResult<BuiltTx> {
            unreachable!("not scripted")
        }

        async fn build_contract_call(
            &self,
            _from: &str,
            _request: &crate::domain::ContractCallRequest,
        ) -> ChainResult<BuiltTx> {
            unreachable!("not scripted")
        }

        async fn build_approve(
            &self,
            _from: &str,
            _request: &crate::domain::ApproveRequest,
        ) -> ChainResult<BuiltTx> {
            unreachable!("not scripted")
        }

        async fn simulate(&self, _tx: &BuiltTx) -> ChainResult<Simulation> {
            self.simulate_calls.fetch_add(1, Ordering::SeqCst);
            if self.simulate_clean_false.load(Ordering::SeqCst) {
                return Ok(Simulation {
                    success: false,
                    logs: vec!["program error".to_string()],
                });
            }
            Ok(Simulation {
                success: true,
                logs: vec![],
            })
        }

        async fn sign(&self, _tx: &BuiltTx, _key: &[u8]) -> ChainResult<Vec<u8>> {
            Ok(vec![9, 9, 9])
        }

        async fn submit(&self, _signed: &[u8]) -> ChainResult<SubmitReceipt> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            match self.submit_script.lock().unwrap().pop_front() {
                Some(code) => Err(self.err(code)),
                None => Ok(SubmitReceipt {
                    tx_hash: "hash".to_string(),
                    status: "submitted".to_string(),
                }),
            }
        }

        async fn wait_for_confirmation(
            &self,
            _tx_hash: &str,
            _timeout: Duration,
        ) -> ChainResult<Confirmation> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.confirm_script.lock().unwrap().pop_front() {
                return Err(self.err(code));
            }
            if self.confirm_reverts.load(Ordering::SeqCst) {
                return Ok(Confirmation {
                    status: ConfirmationStatus::Failed,
                    confirmations: 0,
                    fee: None,
                });
            }
            Ok(Confirmation {
                status: ConfirmationStatus::Confirmed,
                confirmations: 1,
                fee: Some(Decimal::new(5000, 9)),
            })
        }
    }

    /// Records terminal transitions; all writes succeed.
    #[derive(Default)]
    struct RecordingStore {
        statuses: Mutex<Vec<String>>,
        retry_increments: AtomicU32,
    }

    #[async_trait]
    impl ExecutorStore for RecordingStore {
        async fn mark_submitted(&self, _id: Uuid, _tx_hash: &str) -> Result<bool> {
            self.statuses.lock().unwrap().push("SUBMITTED".to_string());
            Ok(true)
        }
        async fn mark_confirmed(&self, _id: Uuid, _details: serde_json::Value) -> Result<bool> {
            self.statuses.lock().unwrap().push("CONFIRMED".to_string());
            Ok(true)
        }
        async fn mark_failed(&self, _id: Uuid, _error_message: &str) -> Result<bool> {
            self.statuses.lock().unwrap().push("FAILED".to_string());
            Ok(true)
        }
        async fn increment_retry_count(&self, _id: Uuid) -> Result<()> {
            self.retry_increments.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticKeys;

    #[async_trait]
    impl KeyProvider for StaticKeys {
        async fn signing_key(&self, _wallet_id: Uuid) -> Result<Zeroizing<Vec<u8>>> {
            Ok(Zeroizing::new(vec![7; 32]))
        }
    }

    #[derive(Default)]
    struct NoopSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn wallet() -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            label: "test".to_string(),
            chain: ChainKind::Solana,
            network: None,
            public_key: "pubkey".to_string(),
            status: WalletStatus::Active,
            owner_address: None,
            owner_verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn transfer() -> TransactionRequest {
        TransactionRequest::Transfer(TransferRequest {
            to: "dest".to_string(),
            amount: "1000".to_string(),
            memo: None,
        })
    }

    struct Harness {
        executor: Executor,
        adapter: Arc<ScriptedAdapter>,
        store: Arc<RecordingStore>,
        sleeper: Arc<NoopSleeper>,
    }

    impl Harness {
        fn statuses(&self) -> Vec<String> {
            self.store.statuses.lock().unwrap().clone()
        }

        fn delays(&self) -> Vec<Duration> {
            self.sleeper.delays.lock().unwrap().clone()
        }
    }

    fn harness(adapter: ScriptedAdapter) -> Harness {
        let adapter = Arc::new(adapter);
        let store = Arc::new(RecordingStore::default());
        let sleeper = Arc::new(NoopSleeper::default());
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let executor = Executor::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(StaticKeys),
            Duration::from_secs(30),
        )
        .with_sleeper(sleeper.clone());
        Harness {
            executor,
            adapter,
            store,
            sleeper,
        }
    }

    #[tokio::test]
    async fn test_clean_run_confirms() {
        let h = harness(ScriptedAdapter::default());
        let receipt = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, "hash");
        assert_eq!(receipt.confirmations, 1);
        assert_eq!(h.statuses(), vec!["SUBMITTED", "CONFIRMED"]);
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_without_retry() {
        let h = harness(ScriptedAdapter::submit_fails_with(&[
            ChainErrorCode::InsufficientBalance,
        ]));
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Chain(_)));
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.statuses(), vec!["FAILED"]);
        assert_eq!(h.store.retry_increments.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_after_three_attempts() {
        let h = harness(ScriptedAdapter::submit_fails_with(&[
            ChainErrorCode::RpcTimeout,
            ChainErrorCode::RpcTimeout,
            ChainErrorCode::RpcTimeout,
        ]));
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Chain(_)));
        // One artifact, three submit attempts, two backoffs.
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            h.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(h.store.retry_increments.load(Ordering::SeqCst), 3);
        assert_eq!(h.statuses(), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn test_transient_error_then_success() {
        let h = harness(ScriptedAdapter::submit_fails_with(&[
            ChainErrorCode::RpcTimeout,
        ]));
        let receipt = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, "hash");
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.store.retry_increments.load(Ordering::SeqCst), 1);
        assert_eq!(h.statuses(), vec!["SUBMITTED", "CONFIRMED"]);
    }

    #[tokio::test]
    async fn test_stale_error_rebuilds_exactly_once() {
        let h = harness(ScriptedAdapter::submit_fails_with(&[
            ChainErrorCode::BlockhashExpired,
            ChainErrorCode::BlockhashExpired,
        ]));
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Chain(_)));
        // Initial build plus one rebuild, then the second STALE kills it.
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 2);
        assert!(h.delays().is_empty());
        assert_eq!(h.store.retry_increments.load(Ordering::SeqCst), 2);
        assert_eq!(h.statuses(), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn test_stale_then_success_after_rebuild() {
        let h = harness(ScriptedAdapter::submit_fails_with(&[
            ChainErrorCode::BlockhashExpired,
        ]));
        let receipt = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, "hash");
        assert_eq!(h.adapter.build_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.statuses(), vec!["SUBMITTED", "CONFIRMED"]);
    }

    #[tokio::test]
    async fn test_failed_simulation_is_permanent() {
        let adapter = ScriptedAdapter::default();
        adapter.simulate_clean_false.store(true, Ordering::SeqCst);
        let h = harness(adapter);
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        match err {
            WardenError::Chain(e) => {
                assert_eq!(e.code, ChainErrorCode::ContractExecutionFailed);
                assert!(e.message.contains("program error"));
            }
            other => panic!("expected chain error, got {other:?}"),
        }
        assert_eq!(h.adapter.simulate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.statuses(), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn test_confirmation_error_is_terminal_even_when_transient() {
        // An RPC timeout while polling must never resubmit.
        let adapter = ScriptedAdapter {
            confirm_script: Mutex::new([ChainErrorCode::RpcTimeout].into_iter().collect()),
            ..Default::default()
        };
        let h = harness(adapter);
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Chain(_)));
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.adapter.confirm_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.statuses(), vec!["SUBMITTED", "FAILED"]);
        assert_eq!(h.store.retry_increments.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_chain_revert_is_terminal() {
        let adapter = ScriptedAdapter::default();
        adapter.confirm_reverts.store(true, Ordering::SeqCst);
        let h = harness(adapter);
        let err = h
            .executor
            .execute(Uuid::new_v4(), &wallet(), &transfer())
            .await
            .unwrap_err();
        match err {
            WardenError::Chain(e) => assert_eq!(e.code, ChainErrorCode::ContractExecutionFailed),
            other => panic!("expected chain error, got {other:?}"),
        }
        assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.statuses(), vec!["SUBMITTED", "FAILED"]);
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        // Capped so a runaway counter cannot stall the loop for hours.
        assert_eq!(backoff_delay(10), Duration::from_secs(16));
    }
}
