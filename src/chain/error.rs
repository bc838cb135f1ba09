//! Chain adapter error taxonomy
//!
//! Adapters surface every failure as a [`ChainError`] carrying one of 29
//! codes. Each code belongs to exactly one category, and the category is
//! the only thing the executor's retry machine looks at:
//! - PERMANENT: non-recoverable, never retried
//! - TRANSIENT: temporary infrastructure issue, backoff and retry the
//!   same built artifact
//! - STALE: the built/signed artifact is no longer valid on chain,
//!   rebuild once and retry

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry category of a chain error. Derived from the code, never stored
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    Permanent,
    Transient,
    Stale,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Permanent => "PERMANENT",
            ErrorCategory::Transient => "TRANSIENT",
            ErrorCategory::Stale => "STALE",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The 29 chain-specific error codes (21 PERMANENT, 4 TRANSIENT, 4 STALE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainErrorCode {
    // PERMANENT
    InsufficientBalance,
    InvalidAddress,
    AccountNotFound,
    ContractExecutionFailed,
    InvalidInstruction,
    ProgramNotFound,
    TokenAccountNotFound,
    InsufficientTokenBalance,
    SpenderNotApproved,
    AtaCreationFailed,
    InvalidProgramData,
    UnauthorizedSigner,
    TransactionTooLarge,
    DuplicateTransaction,
    AccountAlreadyExists,
    InvalidTokenProgram,
    InsufficientForFee,
    BatchNotSupported,
    BatchSizeExceeded,
    InvalidRawTransaction,
    WalletNotSigner,
    // TRANSIENT
    RpcTimeout,
    RpcConnectionError,
    RateLimited,
    NodeBehind,
    // STALE
    BlockhashExpired,
    NonceTooLow,
    NonceAlreadyUsed,
    SlotSkipped,
}

impl ChainErrorCode {
    /// Category mapping. Exhaustive so adding a code forces a decision.
    pub fn category(&self) -> ErrorCategory {
        use ChainErrorCode::*;
        match self {
            InsufficientBalance | InvalidAddress | AccountNotFound | ContractExecutionFailed
            | InvalidInstruction | ProgramNotFound | TokenAccountNotFound
            | InsufficientTokenBalance | SpenderNotApproved | AtaCreationFailed
            | InvalidProgramData | UnauthorizedSigner | TransactionTooLarge
            | DuplicateTransaction | AccountAlreadyExists | InvalidTokenProgram
            | InsufficientForFee | BatchNotSupported | BatchSizeExceeded
            | InvalidRawTransaction | WalletNotSigner => ErrorCategory::Permanent,
            RpcTimeout | RpcConnectionError | RateLimited | NodeBehind => ErrorCategory::Transient,
            BlockhashExpired | NonceTooLow | NonceAlreadyUsed | SlotSkipped => ErrorCategory::Stale,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use ChainErrorCode::*;
        match self {
            InsufficientBalance => "INSUFFICIENT_BALANCE",
            InvalidAddress => "INVALID_ADDRESS",
            AccountNotFound => "ACCOUNT_NOT_FOUND",
            ContractExecutionFailed => "CONTRACT_EXECUTION_FAILED",
            InvalidInstruction => "INVALID_INSTRUCTION",
            ProgramNotFound => "PROGRAM_NOT_FOUND",
            TokenAccountNotFound => "TOKEN_ACCOUNT_NOT_FOUND",
            InsufficientTokenBalance => "INSUFFICIENT_TOKEN_BALANCE",
            SpenderNotApproved => "SPENDER_NOT_APPROVED",
            AtaCreationFailed => "ATA_CREATION_FAILED",
            InvalidProgramData => "INVALID_PROGRAM_DATA",
            UnauthorizedSigner => "UNAUTHORIZED_SIGNER",
            TransactionTooLarge => "TRANSACTION_TOO_LARGE",
            DuplicateTransaction => "DUPLICATE_TRANSACTION",
            AccountAlreadyExists => "ACCOUNT_ALREADY_EXISTS",
            InvalidTokenProgram => "INVALID_TOKEN_PROGRAM",
            InsufficientForFee => "INSUFFICIENT_FOR_FEE",
            BatchNotSupported => "BATCH_NOT_SUPPORTED",
            BatchSizeExceeded => "BATCH_SIZE_EXCEEDED",
            InvalidRawTransaction => "INVALID_RAW_TRANSACTION",
            WalletNotSigner => "WALLET_NOT_SIGNER",
            RpcTimeout => "RPC_TIMEOUT",
            RpcConnectionError => "RPC_CONNECTION_ERROR",
            RateLimited => "RATE_LIMITED",
            NodeBehind => "NODE_BEHIND",
            BlockhashExpired => "BLOCKHASH_EXPIRED",
            NonceTooLow => "NONCE_TOO_LOW",
            NonceAlreadyUsed => "NONCE_ALREADY_USED",
            SlotSkipped => "SLOT_SKIPPED",
        }
    }
}

impl std::fmt::Display for ChainErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Chain adapter internal error. Only the executor interprets the
/// category; everything above it sees the translated public shape.
#[derive(Error, Debug, Clone)]
#[error("[{chain}] {code}: {message}")]
pub struct ChainError {
    pub code: ChainErrorCode,
    pub chain: String,
    pub message: String,
}

impl ChainError {
    pub fn new(code: ChainErrorCode, chain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            chain: chain.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn retryable(&self) -> bool {
        self.category() != ErrorCategory::Permanent
    }

    /// Full shape for structured logs and persisted error details.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "category": self.category().as_str(),
            "chain": self.chain,
            "retryable": self.retryable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_counts_are_fixed() {
        use ChainErrorCode::*;
        let all = [
            InsufficientBalance,
            InvalidAddress,
            AccountNotFound,
            ContractExecutionFailed,
            InvalidInstruction,
            ProgramNotFound,
            TokenAccountNotFound,
            InsufficientTokenBalance,
            SpenderNotApproved,
            AtaCreationFailed,
            InvalidProgramData,
            UnauthorizedSigner,
            TransactionTooLarge,
            DuplicateTransaction,
            AccountAlreadyExists,
            InvalidTokenProgram,
            InsufficientForFee,
            BatchNotSupported,
            BatchSizeExceeded,
            InvalidRawTransaction,
            WalletNotSigner,
            RpcTimeout,
            RpcConnectionError,
            RateLimited,
            NodeBehind,
            BlockhashExpired,
            NonceTooLow,
            NonceAlreadyUsed,
            SlotSkipped,
        ];
        assert_eq!(all.len(), 29);
        let permanent = all
            .iter()
            .filter(|c| c.category() == ErrorCategory::Permanent)
            .count();
        let transient = all
            .iter()
            .filter(|c| c.category() == ErrorCategory::Transient)
            .count();
        let stale = all
            .iter()
            .filter(|c| c.category() == ErrorCategory::Stale)
            .count();
        assert_eq!((permanent, transient, stale), (21, 4, 4));
    }

    #[test]
    fn retryable_is_derived_from_category() {
        let permanent = ChainError::new(ChainErrorCode::InvalidAddress, "solana", "bad address");
        assert!(!permanent.retryable());

        let transient = ChainError::new(ChainErrorCode::RateLimited, "solana", "429");
        assert!(transient.retryable());

        let stale = ChainError::new(ChainErrorCode::BlockhashExpired, "solana", "expired");
        assert!(stale.retryable());
        assert_eq!(stale.category(), ErrorCategory::Stale);
    }

    #[test]
    fn serde_codes_use_screaming_snake_case() {
        let json = serde_json::to_string(&ChainErrorCode::BlockhashExpired).unwrap();
        assert_eq!(json, "\"BLOCKHASH_EXPIRED\"");
        let back: ChainErrorCode = serde_json::from_str("\"RPC_TIMEOUT\"").unwrap();
        assert_eq!(back, ChainErrorCode::RpcTimeout);
    }
}
