use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChainKind;

/// Transaction kind. One variant per request shape; the executor routes
/// each to its own adapter build method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Transfer,
    TokenTransfer,
    ContractCall,
    Approve,
    Batch,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "TRANSFER",
            TxKind::TokenTransfer => "TOKEN_TRANSFER",
            TxKind::ContractCall => "CONTRACT_CALL",
            TxKind::Approve => "APPROVE",
            TxKind::Batch => "BATCH",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TxKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "TRANSFER" => Ok(TxKind::Transfer),
            "TOKEN_TRANSFER" => Ok(TxKind::TokenTransfer),
            "CONTRACT_CALL" => Ok(TxKind::ContractCall),
            "APPROVE" => Ok(TxKind::Approve),
            "BATCH" => Ok(TxKind::Batch),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// Authorization tier. Declaration order is severity order, so `Ord`
/// gives INSTANT < NOTIFY < DELAY < APPROVAL and `max()` picks the
/// stricter tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Instant,
    Notify,
    Delay,
    Approval,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Instant => "INSTANT",
            Tier::Notify => "NOTIFY",
            Tier::Delay => "DELAY",
            Tier::Approval => "APPROVAL",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Tier {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "INSTANT" => Ok(Tier::Instant),
            "NOTIFY" => Ok(Tier::Notify),
            "DELAY" => Ok(Tier::Delay),
            "APPROVAL" => Ok(Tier::Approval),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Transaction status machine. Transitions are monotonic: once a row
/// leaves a status it never returns, and terminal statuses accept no
/// further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Created by stage 1, not yet dispatched
    Pending,
    /// Halted in the delay-queue cooldown
    Queued,
    /// Halted waiting for owner approval
    PendingApproval,
    /// Picked up by the executor
    Executing,
    /// Broadcast to the chain, awaiting confirmation
    Submitted,
    /// Confirmed on chain
    Confirmed,
    /// Terminal failure
    Failed,
    /// Cancelled by the owner or the kill-switch cascade
    Cancelled,
    /// Cooldown or approval window elapsed without action
    Expired,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Confirmed | TxStatus::Failed | TxStatus::Cancelled | TxStatus::Expired
        )
    }

    /// Statuses that may hold a budget reservation at rest.
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            TxStatus::Queued | TxStatus::PendingApproval | TxStatus::Executing
        )
    }

    /// Statuses the kill-switch cascade cancels.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            TxStatus::Pending | TxStatus::Queued | TxStatus::PendingApproval | TxStatus::Executing
        )
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, PendingApproval)
                | (Pending, Executing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Queued, Executing)
                | (Queued, Cancelled)
                | (Queued, Expired)
                | (Queued, Failed)
                | (PendingApproval, Executing)
                | (PendingApproval, Cancelled)
                | (PendingApproval, Expired)
                | (PendingApproval, Failed)
                | (Executing, Submitted)
                | (Executing, Failed)
                | (Executing, Cancelled)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
        )
    }

    pub fn valid_transitions(&self) -> Vec<TxStatus> {
        use TxStatus::*;
        let all = [
            Pending,
            Queued,
            PendingApproval,
            Executing,
            Submitted,
            Confirmed,
            Failed,
            Cancelled,
            Expired,
        ];
        all.into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Queued => "QUEUED",
            TxStatus::PendingApproval => "PENDING_APPROVAL",
            TxStatus::Executing => "EXECUTING",
            TxStatus::Submitted => "SUBMITTED",
            TxStatus::Confirmed => "CONFIRMED",
            TxStatus::Failed => "FAILED",
            TxStatus::Cancelled => "CANCELLED",
            TxStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TxStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TxStatus::Pending),
            "QUEUED" => Ok(TxStatus::Queued),
            "PENDING_APPROVAL" => Ok(TxStatus::PendingApproval),
            "EXECUTING" => Ok(TxStatus::Executing),
            "SUBMITTED" => Ok(TxStatus::Submitted),
            "CONFIRMED" => Ok(TxStatus::Confirmed),
            "FAILED" => Ok(TxStatus::Failed),
            "CANCELLED" => Ok(TxStatus::Cancelled),
            "EXPIRED" => Ok(TxStatus::Expired),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Sparse JSON bag riding on every transaction row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TxMetadata {
    /// Cooldown length for QUEUED rows; expiry = queued_at + this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    /// Shared counter across TRANSIENT and STALE retries (observability
    /// only; the per-category caps are enforced separately)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// The price used for tier evaluation was stale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_stale: Option<bool>,
    /// Approval window end, epoch seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_expires_at: Option<i64>,
    /// Owner signature recorded on approve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_signature: Option<String>,
    /// Original request body; resumed pipelines rebuild from this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<super::TransactionRequest>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Transaction row. `amount` stays a decimal-string of native base
/// units end to end; only USD values are Decimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub session_id: Option<Uuid>,
    pub kind: TxKind,
    pub status: TxStatus,
    pub tier: Option<Tier>,
    pub chain: ChainKind,
    pub network: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    pub amount_usd: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub reserved_amount: Option<Decimal>,
    pub metadata: TxMetadata,
    pub queued_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Cooldown expiry for QUEUED rows.
    pub fn delay_expires_at(&self) -> Option<DateTime<Utc>> {
        match (self.queued_at, self.metadata.delay_seconds) {
            (Some(queued_at), Some(secs)) => Some(queued_at + Duration::seconds(secs)),
            _ => None,
        }
    }

    /// Approval expiry for PENDING_APPROVAL rows.
    pub fn approval_expires_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .approval_expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}
