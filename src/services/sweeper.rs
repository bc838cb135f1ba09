//! Background sweepers for parked rows.
//!
//! Two loops: the delay sweeper promotes QUEUED rows whose cooldown
//! has elapsed and runs them, and the approval sweeper expires
//! PENDING_APPROVAL rows whose window has closed. Both promotions are
//! conditional updates in the store, so overlapping sweeps and a
//! concurrent cancel can never double-process a row. While the kill
//! switch is engaged the sweeps idle; the activation cascade has
//! already cancelled everything they would have touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::adapters::PostgresStore;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::services::notifier::{events, Notifier};
use crate::workflow::{ApprovalWorkflow, DelayQueue};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between delay-promotion sweeps (seconds)
    pub delay_interval_secs: u64,
    /// Interval between approval-expiry sweeps (seconds)
    pub approval_interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            delay_interval_secs: 5,
            approval_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweeperStats {
    pub delays_promoted: u64,
    pub resume_failures: u64,
    pub approvals_expired: u64,
    pub last_sweep: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Sweeper {
    store: PostgresStore,
    pipeline: Arc<Pipeline>,
    delay_queue: DelayQueue,
    approval: ApprovalWorkflow,
    notifier: Notifier,
    config: SweeperConfig,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<SweeperStats>>,
}

impl Sweeper {
    pub fn new(
        store: PostgresStore,
        pipeline: Arc<Pipeline>,
        delay_queue: DelayQueue,
        approval: ApprovalWorkflow,
        notifier: Notifier,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            delay_queue,
            approval,
            notifier,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(SweeperStats::default())),
        }
    }

    pub async fn get_stats(&self) -> SweeperStats {
        self.stats.read().await.clone()
    }

    /// Start both sweep loops.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sweeper already running");
            return;
        }

        info!(
            delay_interval = self.config.delay_interval_secs,
            approval_interval = self.config.approval_interval_secs,
            "Starting sweepers"
        );

        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                sweeper.config.delay_interval_secs,
            ));
            while sweeper.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = sweeper.sweep_delays().await {
                    error!("Delay sweep failed: {}", e);
                }
            }
            info!("Delay sweeper stopped");
        });

        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                sweeper.config.approval_interval_secs,
            ));
            while sweeper.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = sweeper.sweep_approvals().await {
                    error!("Approval sweep failed: {}", e);
                }
            }
            info!("Approval sweeper stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Sweeper stop requested");
    }

    /// Promote expired QUEUED rows and run each to a terminal status.
    /// One failed row never stops the rest of the batch.
    pub async fn sweep_delays(&self) -> Result<()> {
        if self.halted().await? {
            return Ok(());
        }

        let promoted = self.delay_queue.process_expired(Utc::now()).await?;
        if promoted.is_empty() {
            return Ok(());
        }

        let mut resumed = 0u64;
        let mut failures = 0u64;
        for tx in &promoted {
            match self.pipeline.resume(tx).await {
                Ok(receipt) => {
                    resumed += 1;
                    debug!(tx_id = %tx.id, tx_hash = %receipt.tx_hash, "Promoted delay confirmed");
                }
                Err(e) => {
                    failures += 1;
                    error!(tx_id = %tx.id, error = %e, "Promoted delay failed");
                }
            }
        }

        let mut s = self.stats.write().await;
        s.delays_promoted += resumed;
        s.resume_failures += failures;
        s.last_sweep = Some(Utc::now());
        Ok(())
    }

    /// Flip PENDING_APPROVAL rows past their window to EXPIRED.
    pub async fn sweep_approvals(&self) -> Result<()> {
        if self.halted().await? {
            return Ok(());
        }

        let expired = self.approval.process_expired_approvals(Utc::now()).await?;
        for tx in &expired {
            self.notifier.notify(
                events::TX_EXPIRED,
                Some(tx.wallet_id),
                Some(tx.id),
                "approval window elapsed",
            );
        }

        if !expired.is_empty() {
            let mut s = self.stats.write().await;
            s.approvals_expired += expired.len() as u64;
            s.last_sweep = Some(Utc::now());
        }
        Ok(())
    }

    async fn halted(&self) -> Result<bool> {
        let engaged = self.store.get_kill_switch().await?.state.is_engaged();
        if engaged {
            debug!("Sweep skipped, kill switch engaged");
        }
        Ok(engaged)
    }
}
