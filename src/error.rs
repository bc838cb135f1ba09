use crate::chain::ChainError;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the authorization daemon
#[derive(Error, Debug)]
pub enum WardenError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Request validation errors (synchronous, never persisted)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Policy errors
    #[error("Policy denied: {reason}")]
    PolicyDenied { reason: String },

    // Chain execution errors carry their own code/category taxonomy
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    // State conflicts: the object is not in the state the operation requires
    #[error("Transaction {tx_id} already processed: status is {status}")]
    TxAlreadyProcessed { tx_id: String, status: String },

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Owner already connected and verified")]
    OwnerAlreadyConnected,

    #[error("No owner connected")]
    OwnerNotConnected,

    #[error("Wallet {0} is suspended")]
    WalletSuspended(String),

    // Gating errors
    #[error("Kill switch engaged: {state}")]
    KillSwitchEngaged { state: String },

    // Price resolution errors
    #[error("Price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Token not listed: {token} on {chain}")]
    TokenNotListed { token: String, chain: String },

    // Lookup errors
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("No adapter registered for chain: {0}")]
    AdapterNotFound(String),

    // Signing-key errors
    #[error("Key error: {0}")]
    Key(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for WardenError
pub type Result<T> = std::result::Result<T, WardenError>;

/// Stable error shape crossing the pipeline boundary.
///
/// Internal errors are always translated to this one shape before they
/// reach a caller; chain errors keep their taxonomy code and retryable
/// flag, everything else maps to a fixed code with retryable=false
/// except the explicitly transient cases.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&WardenError> for PublicError {
    fn from(err: &WardenError) -> Self {
        let (code, retryable) = match err {
            WardenError::Validation(_) => ("VALIDATION_ERROR", false),
            WardenError::PolicyDenied { .. } => ("POLICY_DENIED", false),
            WardenError::Chain(chain) => {
                return PublicError {
                    code: chain.code.as_str().to_string(),
                    message: chain.message.clone(),
                    retryable: chain.retryable(),
                }
            }
            WardenError::TxAlreadyProcessed { .. }
            | WardenError::InvalidStateTransition { .. }
            | WardenError::OwnerAlreadyConnected
            | WardenError::OwnerNotConnected
            | WardenError::WalletSuspended(_) => ("STATE_CONFLICT", false),
            WardenError::KillSwitchEngaged { .. } => ("KILL_SWITCH_ACTIVE", false),
            WardenError::OracleUnavailable(_) => ("ORACLE_UNAVAILABLE", true),
            WardenError::TokenNotListed { .. } => ("TOKEN_NOT_LISTED", false),
            WardenError::WalletNotFound(_) => ("WALLET_NOT_FOUND", false),
            WardenError::TransactionNotFound(_) => ("TX_NOT_FOUND", false),
            WardenError::AdapterNotFound(_) => ("ADAPTER_NOT_FOUND", false),
            WardenError::Database(_) | WardenError::Migration(_) => ("STORAGE_ERROR", true),
            _ => ("INTERNAL_ERROR", false),
        };
        PublicError {
            code: code.to_string(),
            message: err.to_string(),
            retryable,
        }
    }
}
