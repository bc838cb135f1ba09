use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{ChainError, ChainErrorCode};
use crate::domain::{
    ApproveRequest, BatchRequest, ChainKind, ContractCallRequest, TokenTransferRequest,
    TransferRequest,
};

pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Build output: the unsigned artifact plus whatever the adapter needs
/// to carry between build and submit (blockhash, nonce, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltTx {
    pub serialized: Vec<u8>,
    pub estimated_fee: Option<Decimal>,
    pub metadata: serde_json::Value,
}

/// Dry-run outcome. A clean `false` (no thrown error) is still a
/// permanent failure for the executor.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub success: bool,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub tx_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub status: ConfirmationStatus,
    pub confirmations: u32,
    pub fee: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct BalanceInfo {
    /// Base units, decimal-string
    pub amount: String,
    pub decimals: u32,
    pub symbol: Option<String>,
}

fn unsupported(feature: &str, chain: ChainKind) -> ChainError {
    ChainError::new(
        ChainErrorCode::BatchNotSupported,
        chain.as_str(),
        format!("{} is not supported on {}", feature, chain),
    )
}

/// Per-chain execution contract. One implementation per chain family,
/// registered in the [`AdapterRegistry`](super::AdapterRegistry).
/// Every fallible call fails with a categorized [`ChainError`]; only
/// the executor interprets the category.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainKind;

    async fn connect(&self) -> ChainResult<()>;

    async fn disconnect(&self) -> ChainResult<()>;

    fn is_connected(&self) -> bool;

    async fn get_balance(&self, address: &str) -> ChainResult<BalanceInfo>;

    async fn build_transfer(&self, from: &str, request: &TransferRequest) -> ChainResult<BuiltTx>;

    async fn build_token_transfer(
        &self,
        from: &str,
        request: &TokenTransferRequest,
    ) -> ChainResult<BuiltTx>;

    async fn build_contract_call(
        &self,
        from: &str,
        request: &ContractCallRequest,
    ) -> ChainResult<BuiltTx>;

    async fn build_approve(&self, from: &str, request: &ApproveRequest) -> ChainResult<BuiltTx>;

    async fn build_batch(&self, _from: &str, _request: &BatchRequest) -> ChainResult<BuiltTx> {
        Err(unsupported("build_batch", self.chain()))
    }

    async fn simulate(&self, tx: &BuiltTx) -> ChainResult<Simulation>;

    async fn sign(&self, tx: &BuiltTx, key: &[u8]) -> ChainResult<Vec<u8>>;

    async fn submit(&self, signed: &[u8]) -> ChainResult<SubmitReceipt>;

    async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        timeout: Duration,
    ) -> ChainResult<Confirmation>;
}

/// Signing-key source. Key bytes come back in a zeroizing buffer and
/// must not outlive the sign call.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn signing_key(&self, wallet_id: Uuid) -> crate::error::Result<Zeroizing<Vec<u8>>>;
}
