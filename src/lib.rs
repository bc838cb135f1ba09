pub mod adapters;
pub mod chain;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod services;
pub mod validation;
pub mod workflow;

pub use adapters::{BudgetReservation, PostgresStore, TransactionFilter};
pub use chain::{AdapterRegistry, ChainAdapter, ChainError, FileKeyProvider, KeyProvider};
pub use config::AppConfig;
pub use error::{PublicError, Result, WardenError};
pub use oracle::{HermesOracle, OracleError, PriceOracle, PriceQuote, TokenRef};
pub use pipeline::{AmountResolver, ExecutionReceipt, Executor, Pipeline, SubmitOutcome};
pub use policy::{PolicyConfig, PolicyDecision, PolicyEngine};
pub use services::{
    HealthServer, HealthState, KillSwitchService, LogChannel, NotificationChannel, Notifier,
    Sweeper, SweeperConfig, WebhookChannel,
};
pub use workflow::{ApprovalWorkflow, DelayQueue, OwnerLifecycle};
