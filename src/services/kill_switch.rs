//! Global halt switch.
//!
//! One singleton row gates the whole pipeline. Activation is a CAS so
//! exactly one caller wins and runs the cascade; everybody else gets a
//! state conflict. The cascade order matters: in-flight rows are
//! cancelled before wallets are suspended, so nothing new can slip in
//! between the two steps through an already suspended wallet.

use serde_json::json;
use tracing::{error, info, warn};

use crate::adapters::PostgresStore;
use crate::domain::{AuditSeverity, KillSwitch, KillSwitchState};
use crate::error::{Result, WardenError};
use crate::services::notifier::{events, Notifier};

#[derive(Clone)]
pub struct KillSwitchService {
    store: PostgresStore,
    notifier: Notifier,
}

impl KillSwitchService {
    pub fn new(store: PostgresStore, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Seed the ACTIVE singleton on first start.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.store.ensure_kill_switch_initialized().await
    }

    pub async fn status(&self) -> Result<KillSwitch> {
        self.store.get_kill_switch().await
    }

    /// ACTIVE -> SUSPENDED, then the cascade. A lost CAS means the
    /// switch is already engaged and comes back as a conflict.
    pub async fn activate(&self, activated_by: &str, reason: &str) -> Result<()> {
        let won = self
            .store
            .kill_switch_cas_engage(
                KillSwitchState::Active,
                KillSwitchState::Suspended,
                activated_by,
                reason,
            )
            .await?;
        if !won {
            let current = self.store.get_kill_switch().await?;
            return Err(WardenError::KillSwitchEngaged {
                state: current.state.to_string(),
            });
        }

        warn!(activated_by, reason, "kill switch activated");

        let cancelled = self
            .store
            .cancel_in_flight_transactions("kill switch activated")
            .await?;
        let suspended = self.store.suspend_active_wallets().await?;
        info!(
            cancelled = cancelled.len(),
            suspended, "kill switch cascade complete"
        );

        self.notifier.notify(
            events::KILL_SWITCH_ACTIVATED,
            None,
            None,
            format!("kill switch activated by {}: {}", activated_by, reason),
        );
        self.store
            .append_audit(
                events::KILL_SWITCH_ACTIVATED,
                AuditSeverity::Critical,
                None,
                None,
                json!({
                    "activated_by": activated_by,
                    "reason": reason,
                    "cancelled_transactions": cancelled.len(),
                    "suspended_wallets": suspended,
                }),
            )
            .await?;
        Ok(())
    }

    /// SUSPENDED -> LOCKED. Keeps the activation metadata; only the
    /// severity changes.
    pub async fn escalate(&self) -> Result<()> {
        let won = self
            .store
            .kill_switch_cas_keep(KillSwitchState::Suspended, KillSwitchState::Locked)
            .await?;
        if !won {
            let current = self.store.get_kill_switch().await?;
            return Err(WardenError::InvalidStateTransition {
                from: current.state.to_string(),
                to: KillSwitchState::Locked.to_string(),
            });
        }

        error!("kill switch escalated to LOCKED");
        self.notifier.notify(
            events::KILL_SWITCH_ESCALATED,
            None,
            None,
            "kill switch escalated to LOCKED",
        );
        self.store
            .append_audit(
                events::KILL_SWITCH_ESCALATED,
                AuditSeverity::Critical,
                None,
                None,
                json!({}),
            )
            .await?;
        Ok(())
    }

    /// Back to ACTIVE from either engaged state, clearing the
    /// activation metadata and reactivating suspended wallets.
    pub async fn recover(&self, recovered_by: &str) -> Result<()> {
        let won = self
            .store
            .kill_switch_cas_clear(KillSwitchState::Suspended, KillSwitchState::Active)
            .await?
            || self
                .store
                .kill_switch_cas_clear(KillSwitchState::Locked, KillSwitchState::Active)
                .await?;
        if !won {
            let current = self.store.get_kill_switch().await?;
            return Err(WardenError::InvalidStateTransition {
                from: current.state.to_string(),
                to: KillSwitchState::Active.to_string(),
            });
        }

        let reactivated = self.store.reactivate_suspended_wallets().await?;
        info!(recovered_by, reactivated, "kill switch recovered");

        self.notifier.notify(
            events::KILL_SWITCH_RECOVERED,
            None,
            None,
            format!("kill switch recovered by {}", recovered_by),
        );
        self.store
            .append_audit(
                events::KILL_SWITCH_RECOVERED,
                AuditSeverity::Info,
                None,
                None,
                json!({
                    "recovered_by": recovered_by,
                    "reactivated_wallets": reactivated,
                }),
            )
            .await?;
        Ok(())
    }
}
