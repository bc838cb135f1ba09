pub mod error;
pub mod keys;
pub mod registry;
pub mod traits;

pub use error::{ChainError, ChainErrorCode, ErrorCategory};
pub use keys::FileKeyProvider;
pub use registry::AdapterRegistry;
pub use traits::{
    BalanceInfo, BuiltTx, ChainAdapter, ChainResult, Confirmation, ConfirmationStatus, KeyProvider,
    Simulation, SubmitReceipt,
};
