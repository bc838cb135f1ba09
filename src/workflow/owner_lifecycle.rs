//! Per-wallet owner binding: NONE -> GRACE -> LOCKED.
//!
//! The state is derived from two wallet columns and every transition is
//! a conditional update, so concurrent binds cannot race past the
//! verification lock. A LOCKED owner can only be replaced by operator
//! intervention outside this service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::domain::{AuditSeverity, OwnerState, Wallet};
use crate::error::{Result, WardenError};

#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn set_wallet_owner(&self, id: Uuid, owner_address: &str) -> Result<bool>;
    async fn clear_wallet_owner(&self, id: Uuid) -> Result<bool>;
    async fn set_owner_verified(&self, id: Uuid) -> Result<bool>;
    async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>>;
    async fn append_audit(
        &self,
        event: &str,
        severity: AuditSeverity,
        wallet_id: Option<Uuid>,
        tx_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()>;
}

#[async_trait]
impl OwnerStore for PostgresStore {
    async fn set_wallet_owner(&self, id: Uuid, owner_address: &str) -> Result<bool> {
        self.set_wallet_owner(id, owner_address).await
    }
    async fn clear_wallet_owner(&self, id: Uuid) -> Result<bool> {
        self.clear_wallet_owner(id).await
    }
    async fn set_owner_verified(&self, id: Uuid) -> Result<bool> {
        self.set_owner_verified(id).await
    }
    async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>> {
        self.get_wallet(id).await
    }
    async fn append_audit(
        &self,
        event: &str,
        severity: AuditSeverity,
        wallet_id: Option<Uuid>,
        tx_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()> {
        self.append_audit(event, severity, wallet_id, tx_id, details)
            .await
    }
}

#[derive(Clone)]
pub struct OwnerLifecycle {
    store: Arc<dyn OwnerStore>,
}

impl OwnerLifecycle {
    pub fn new(store: Arc<dyn OwnerStore>) -> Self {
        Self { store }
    }

    /// Bind an owner address. Succeeds from NONE and GRACE (a pending
    /// bind may be replaced); a verified owner cannot be overwritten.
    pub async fn set_owner(&self, wallet_id: Uuid, owner_address: &str) -> Result<()> {
        let owner_address = owner_address.trim();
        if owner_address.is_empty() {
            return Err(WardenError::Validation(
                "owner address must not be empty".to_string(),
            ));
        }

        if self.store.set_wallet_owner(wallet_id, owner_address).await? {
            info!(wallet_id = %wallet_id, "owner connected");
            self.store
                .append_audit(
                    "OWNER_CONNECTED",
                    AuditSeverity::Info,
                    Some(wallet_id),
                    None,
                    json!({ "owner_address": owner_address }),
                )
                .await?;
            return Ok(());
        }

        match self.owner_state(wallet_id).await? {
            OwnerState::Locked => Err(WardenError::OwnerAlreadyConnected),
            _ => Err(WardenError::Internal(
                "wallet owner changed concurrently".to_string(),
            )),
        }
    }

    /// Unbind a pending (unverified) owner. NONE is a no-op; LOCKED
    /// refuses.
    pub async fn remove_owner(&self, wallet_id: Uuid) -> Result<()> {
        if self.store.clear_wallet_owner(wallet_id).await? {
            info!(wallet_id = %wallet_id, "owner removed");
            self.store
                .append_audit(
                    "OWNER_REMOVED",
                    AuditSeverity::Info,
                    Some(wallet_id),
                    None,
                    json!({}),
                )
                .await?;
            return Ok(());
        }

        match self.owner_state(wallet_id).await? {
            OwnerState::None => Ok(()),
            OwnerState::Locked => Err(WardenError::OwnerAlreadyConnected),
            OwnerState::Grace => Err(WardenError::Internal(
                "wallet owner changed concurrently".to_string(),
            )),
        }
    }

    /// GRACE -> LOCKED once ownership is proven. Verifying an already
    /// LOCKED wallet is a no-op.
    pub async fn mark_owner_verified(&self, wallet_id: Uuid) -> Result<()> {
        if self.store.set_owner_verified(wallet_id).await? {
            info!(wallet_id = %wallet_id, "owner verified");
            self.store
                .append_audit(
                    "OWNER_VERIFIED",
                    AuditSeverity::Info,
                    Some(wallet_id),
                    None,
                    json!({}),
                )
                .await?;
            return Ok(());
        }

        match self.owner_state(wallet_id).await? {
            OwnerState::Locked => Ok(()),
            OwnerState::None => Err(WardenError::OwnerNotConnected),
            OwnerState::Grace => Err(WardenError::Internal(
                "wallet owner changed concurrently".to_string(),
            )),
        }
    }

    async fn owner_state(&self, wallet_id: Uuid) -> Result<OwnerState> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WardenError::WalletNotFound(wallet_id.to_string()))?;
        Ok(wallet.owner_state())
    }
}
