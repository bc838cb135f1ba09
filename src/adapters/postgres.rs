use crate::domain::{
    AuditEntry, AuditSeverity, KillSwitch, KillSwitchState, Policy, PolicyKind, Tier, Transaction,
    TxKind, TxMetadata, TxStatus, Wallet, WalletStatus,
};
use crate::error::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

const TX_COLUMNS: &str = r#"
    id, wallet_id, session_id, kind, status, tier, chain, network,
    from_address, to_address, amount, amount_usd, tx_hash, error_message,
    reserved_amount, metadata, queued_at, executed_at, created_at, updated_at
"#;

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connectivity probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Wallets ====================

    pub async fn create_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, label, chain, network, public_key, status,
                owner_address, owner_verified, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.label)
        .bind(wallet.chain.as_str())
        .bind(&wallet.network)
        .bind(&wallet.public_key)
        .bind(wallet.status.as_str())
        .bind(&wallet.owner_address)
        .bind(wallet.owner_verified)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, label, chain, network, public_key, status,
                   owner_address, owner_verified, created_at, updated_at
            FROM wallets WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_wallet_row(&r)).transpose()
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, label, chain, network, public_key, status,
                   owner_address, owner_verified, created_at, updated_at
            FROM wallets ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_wallet_row).collect()
    }

    pub async fn update_wallet_status(&self, id: Uuid, status: WalletStatus) -> Result<()> {
        sqlx::query("UPDATE wallets SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Suspend every ACTIVE wallet (kill-switch cascade step 2).
    pub async fn suspend_active_wallets(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE wallets SET status = 'SUSPENDED', updated_at = NOW() WHERE status = 'ACTIVE'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Reactivate every SUSPENDED wallet (kill-switch recovery).
    pub async fn reactivate_suspended_wallets(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE wallets SET status = 'ACTIVE', updated_at = NOW() WHERE status = 'SUSPENDED'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Bind an owner address. Conditional on the wallet not being
    /// verified yet; a verified binding can never be overwritten.
    pub async fn set_wallet_owner(&self, id: Uuid, owner_address: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET owner_address = $2, owner_verified = FALSE, updated_at = NOW()
            WHERE id = $1 AND owner_verified = FALSE
            "#,
        )
        .bind(id)
        .bind(owner_address)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove an unverified owner binding.
    pub async fn clear_wallet_owner(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET owner_address = NULL, owner_verified = FALSE, updated_at = NOW()
            WHERE id = $1 AND owner_address IS NOT NULL AND owner_verified = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Verify the bound owner.
    pub async fn set_owner_verified(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET owner_verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND owner_address IS NOT NULL AND owner_verified = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ==================== Transactions ====================

    #[instrument(skip(self, tx), fields(tx_id = %tx.id))]
    pub async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, wallet_id, session_id, kind, status, tier, chain, network,
                from_address, to_address, amount, amount_usd, tx_hash, error_message,
                reserved_amount, metadata, queued_at, executed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(tx.id)
        .bind(tx.wallet_id)
        .bind(tx.session_id)
        .bind(tx.kind.as_str())
        .bind(tx.status.as_str())
        .bind(tx.tier.map(|t| t.as_str()))
        .bind(tx.chain.as_str())
        .bind(&tx.network)
        .bind(&tx.from_address)
        .bind(&tx.to_address)
        .bind(&tx.amount)
        .bind(tx.amount_usd)
        .bind(&tx.tx_hash)
        .bind(&tx.error_message)
        .bind(tx.reserved_amount)
        .bind(serde_json::to_value(&tx.metadata)?)
        .bind(tx.queued_at)
        .bind(tx.executed_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(kind = %tx.kind, "Inserted transaction");
        Ok(())
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| map_tx_row(&r)).transpose()
    }

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let limit = filter.limit.unwrap_or(100);

        let mut conditions = Vec::new();
        let mut idx = 1u32;

        if filter.wallet_id.is_some() {
            conditions.push(format!("wallet_id = ${idx}"));
            idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${idx}"));
            idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions {where_clause} ORDER BY created_at DESC LIMIT ${idx}"
        );

        let mut query = sqlx::query(&sql);
        if let Some(wallet_id) = filter.wallet_id {
            query = query.bind(wallet_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(map_tx_row).collect()
    }

    pub async fn count_transactions_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM transactions GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("status"), r.get("count")))
            .collect())
    }

    /// Transactions created for a wallet since the given instant
    /// (rate-limit window count; the row under evaluation is included).
    pub async fn count_recent_transactions(
        &self,
        wallet_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM transactions WHERE wallet_id = $1 AND created_at > $2",
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }

    /// Record the USD resolution outcome on the row.
    pub async fn update_resolution(
        &self,
        id: Uuid,
        amount_usd: Decimal,
        is_stale: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET amount_usd = $2,
                metadata = CASE WHEN $3 THEN metadata || '{"is_stale": true}'::jsonb
                                ELSE metadata END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount_usd)
        .bind(is_stale)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Status flips below are all conditional on the expected prior
    // status; the affected-row count is the concurrency guard. Flips
    // that leave the reservation-holding statuses release the
    // reservation in the same statement.

    /// PENDING -> EXECUTING (INSTANT / NOTIFY dispatch).
    pub async fn mark_executing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'EXECUTING', updated_at = NOW() WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// PENDING -> QUEUED with the cooldown recorded in metadata.
    pub async fn mark_queued(
        &self,
        id: Uuid,
        queued_at: DateTime<Utc>,
        delay_seconds: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'QUEUED', queued_at = $2,
                metadata = metadata || jsonb_build_object('delay_seconds', $3::bigint),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(queued_at)
        .bind(delay_seconds)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// PENDING -> PENDING_APPROVAL with the approval window end.
    pub async fn mark_pending_approval(&self, id: Uuid, expires_at_epoch: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'PENDING_APPROVAL',
                metadata = metadata || jsonb_build_object('approval_expires_at', $2::bigint),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(expires_at_epoch)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// EXECUTING -> SUBMITTED. The budget hold converts into window
    /// spend at this point, so the reservation is released here.
    pub async fn mark_submitted(&self, id: Uuid, tx_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'SUBMITTED', tx_hash = $2, reserved_amount = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'EXECUTING'
            "#,
        )
        .bind(id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// SUBMITTED -> CONFIRMED, merging confirmation details (fee,
    /// confirmations) into metadata.
    pub async fn mark_confirmed(&self, id: Uuid, details: serde_json::Value) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'CONFIRMED', executed_at = NOW(), metadata = metadata || $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'SUBMITTED'
            "#,
        )
        .bind(id)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Any non-terminal status -> FAILED, releasing the reservation.
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'FAILED', error_message = $2, reserved_amount = NULL, updated_at = NOW()
            WHERE id = $1
              AND status IN ('PENDING', 'QUEUED', 'PENDING_APPROVAL', 'EXECUTING', 'SUBMITTED')
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Conditional flip to CANCELLED from one of the expected statuses.
    pub async fn mark_cancelled(
        &self,
        id: Uuid,
        expected: &[TxStatus],
        reason: &str,
    ) -> Result<bool> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'CANCELLED', error_message = $2, reserved_amount = NULL, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(&expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Approve a PENDING_APPROVAL row before its window closes,
    /// recording the owner signature. A row whose window already
    /// elapsed does not flip even if the expiry sweep has not yet
    /// caught it.
    pub async fn approve_transaction(
        &self,
        id: Uuid,
        signature: &str,
        now_epoch: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'EXECUTING',
                metadata = metadata || jsonb_build_object('owner_signature', $2::text),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING_APPROVAL'
              AND COALESCE((metadata->>'approval_expires_at')::bigint, 0) > $3
            "#,
        )
        .bind(id)
        .bind(signature)
        .bind(now_epoch)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Bump the shared retry counter in metadata.
    pub async fn increment_retry_count(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET metadata = jsonb_set(
                    metadata, '{retry_count}',
                    to_jsonb(COALESCE((metadata->>'retry_count')::int, 0) + 1)
                ),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip QUEUED rows whose cooldown has elapsed to EXECUTING and
    /// return exactly the rows this call flipped. Overlapping sweeps
    /// cannot double-promote: a row is only returned by the statement
    /// that actually changed it.
    #[instrument(skip(self))]
    pub async fn promote_expired_delays(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'EXECUTING', updated_at = NOW()
            WHERE status = 'QUEUED'
              AND queued_at + (COALESCE((metadata->>'delay_seconds')::bigint, 0)
                               * INTERVAL '1 second') <= $1
            RETURNING {TX_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql).bind(now).fetch_all(&self.pool).await?;

        if !rows.is_empty() {
            debug!(count = rows.len(), "Promoted expired delay rows");
        }
        rows.iter().map(map_tx_row).collect()
    }

    /// Expire PENDING_APPROVAL rows whose window has closed, releasing
    /// their reservations. Returns the rows this call flipped.
    #[instrument(skip(self))]
    pub async fn expire_stale_approvals(&self, now_epoch: i64) -> Result<Vec<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'EXPIRED', reserved_amount = NULL, updated_at = NOW()
            WHERE status = 'PENDING_APPROVAL'
              AND COALESCE((metadata->>'approval_expires_at')::bigint, 0) <= $1
            RETURNING {TX_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(now_epoch)
            .fetch_all(&self.pool)
            .await?;

        if !rows.is_empty() {
            debug!(count = rows.len(), "Expired stale approval rows");
        }
        rows.iter().map(map_tx_row).collect()
    }

    /// Cancel everything still in flight (kill-switch cascade step 1).
    /// Returns the cancelled rows so the caller can report them.
    pub async fn cancel_in_flight_transactions(&self, reason: &str) -> Result<Vec<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'CANCELLED', error_message = $1, reserved_amount = NULL, updated_at = NOW()
            WHERE status IN ('PENDING', 'QUEUED', 'PENDING_APPROVAL', 'EXECUTING')
            RETURNING {TX_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql).bind(reason).fetch_all(&self.pool).await?;
        rows.iter().map(map_tx_row).collect()
    }

    /// Fail rows a previous process left mid-pipeline. PENDING rows
    /// have no task driving them after a restart and EXECUTING rows
    /// lost theirs; QUEUED and PENDING_APPROVAL rows are untouched
    /// because the sweepers resume those.
    pub async fn fail_interrupted(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'FAILED', error_message = 'Interrupted by daemon restart',
                reserved_amount = NULL, updated_at = NOW()
            WHERE status IN ('PENDING', 'EXECUTING') AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Produce the precise error for a conditional flip that affected
    /// zero rows.
    pub async fn status_conflict(&self, id: Uuid) -> WardenError {
        match self.get_transaction(id).await {
            Ok(Some(tx)) => WardenError::TxAlreadyProcessed {
                tx_id: id.to_string(),
                status: tx.status.to_string(),
            },
            Ok(None) => WardenError::TransactionNotFound(id.to_string()),
            Err(err) => err,
        }
    }

    // ==================== Budget Reservation ====================

    /// Check the cumulative cap and write the reservation in one
    /// exclusive transaction. The wallet row lock serializes
    /// concurrent reservations per wallet, so no suspension point
    /// exists between the cap check and the write.
    #[instrument(skip(self))]
    pub async fn reserve_budget(
        &self,
        wallet_id: Uuid,
        tx_id: Uuid,
        amount_usd: Decimal,
        tier: Tier,
        daily_cap_usd: Option<Decimal>,
        window: Duration,
    ) -> Result<BudgetReservation> {
        let mut dbtx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut *dbtx)
            .await?
            .ok_or_else(|| WardenError::WalletNotFound(wallet_id.to_string()))?;

        // Holds on rows that are not yet terminal, including PENDING
        // rows reserved but not yet dispatched
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(reserved_amount), 0) AS in_flight
            FROM transactions
            WHERE wallet_id = $1 AND reserved_amount IS NOT NULL
              AND status IN ('PENDING', 'QUEUED', 'PENDING_APPROVAL', 'EXECUTING')
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *dbtx)
        .await?;
        let in_flight: Decimal = row.get("in_flight");

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_usd), 0) AS window_spend
            FROM transactions
            WHERE wallet_id = $1 AND status IN ('SUBMITTED', 'CONFIRMED') AND created_at > $2
            "#,
        )
        .bind(wallet_id)
        .bind(Utc::now() - window)
        .fetch_one(&mut *dbtx)
        .await?;
        let window_spend: Decimal = row.get("window_spend");

        if let Some(cap) = daily_cap_usd {
            if in_flight + window_spend + amount_usd > cap {
                dbtx.rollback().await?;
                return Ok(BudgetReservation {
                    reserved: false,
                    in_flight,
                    window_spend,
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE transactions
            SET reserved_amount = $2, tier = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(tx_id)
        .bind(amount_usd)
        .bind(tier.as_str())
        .execute(&mut *dbtx)
        .await?;

        dbtx.commit().await?;
        Ok(BudgetReservation {
            reserved: true,
            in_flight,
            window_spend,
        })
    }

    // ==================== Policies ====================

    pub async fn insert_policy(&self, policy: &Policy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO policies (id, wallet_id, kind, rules, priority, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(policy.id)
        .bind(policy.wallet_id)
        .bind(policy.kind.as_str())
        .bind(&policy.rules)
        .bind(policy.priority)
        .bind(policy.enabled)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enabled policies applying to a wallet: wallet-specific rows
    /// first, then global rows, priority-descending within each group.
    pub async fn get_policies_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<Policy>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, kind, rules, priority, enabled, created_at, updated_at
            FROM policies
            WHERE enabled AND (wallet_id = $1 OR wallet_id IS NULL)
            ORDER BY (wallet_id IS NOT NULL) DESC, priority DESC, created_at ASC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_policy_row).collect()
    }

    pub async fn list_policies(&self) -> Result<Vec<Policy>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, kind, rules, priority, enabled, created_at, updated_at
            FROM policies ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_policy_row).collect()
    }

    // ==================== Kill Switch ====================

    /// Insert the ACTIVE singleton if it does not exist yet.
    pub async fn ensure_kill_switch_initialized(&self) -> Result<()> {
        sqlx::query(
            "INSERT INTO kill_switch (id, state) VALUES (TRUE, 'ACTIVE') ON CONFLICT (id) DO NOTHING",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_kill_switch(&self) -> Result<KillSwitch> {
        let row = sqlx::query(
            "SELECT state, activated_at, activated_by, reason, updated_at FROM kill_switch WHERE id = TRUE",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WardenError::Internal("kill switch row missing".to_string()))?;

        let state: String = row.get("state");
        Ok(KillSwitch {
            state: KillSwitchState::try_from(state.as_str()).map_err(WardenError::Internal)?,
            activated_at: row.get("activated_at"),
            activated_by: row.get("activated_by"),
            reason: row.get("reason"),
            updated_at: row.get("updated_at"),
        })
    }

    /// CAS flip that records activation metadata (engagement).
    pub async fn kill_switch_cas_engage(
        &self,
        expected: KillSwitchState,
        next: KillSwitchState,
        activated_by: &str,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE kill_switch
            SET state = $2, activated_at = NOW(), activated_by = $3, reason = $4, updated_at = NOW()
            WHERE id = TRUE AND state = $1
            "#,
        )
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(activated_by)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// CAS flip that keeps the existing activation metadata
    /// (SUSPENDED -> LOCKED escalation).
    pub async fn kill_switch_cas_keep(
        &self,
        expected: KillSwitchState,
        next: KillSwitchState,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE kill_switch SET state = $2, updated_at = NOW() WHERE id = TRUE AND state = $1",
        )
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// CAS flip that clears activation metadata (recovery to ACTIVE).
    pub async fn kill_switch_cas_clear(
        &self,
        expected: KillSwitchState,
        next: KillSwitchState,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE kill_switch
            SET state = $2, activated_at = NULL, activated_by = NULL, reason = NULL, updated_at = NOW()
            WHERE id = TRUE AND state = $1
            "#,
        )
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ==================== Audit Log ====================

    pub async fn append_audit(
        &self,
        event: &str,
        severity: AuditSeverity,
        wallet_id: Option<Uuid>,
        tx_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (event, severity, wallet_id, tx_id, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event)
        .bind(severity.as_str())
        .bind(wallet_id)
        .bind(tx_id)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event, severity, wallet_id, tx_id, details, created_at
            FROM audit_log ORDER BY id DESC LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let severity: String = r.get("severity");
                Ok(AuditEntry {
                    id: r.get("id"),
                    event: r.get("event"),
                    severity: AuditSeverity::try_from(severity.as_str())
                        .map_err(WardenError::Internal)?,
                    wallet_id: r.get("wallet_id"),
                    tx_id: r.get("tx_id"),
                    details: r.get("details"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }
}

fn map_wallet_row(row: &PgRow) -> Result<Wallet> {
    let chain: String = row.get("chain");
    let status: String = row.get("status");
    Ok(Wallet {
        id: row.get("id"),
        label: row.get("label"),
        chain: chain.parse().map_err(WardenError::Internal)?,
        network: row.get("network"),
        public_key: row.get("public_key"),
        status: WalletStatus::try_from(status.as_str()).map_err(WardenError::Internal)?,
        owner_address: row.get("owner_address"),
        owner_verified: row.get("owner_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_tx_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let tier: Option<String> = row.get("tier");
    let chain: String = row.get("chain");
    let metadata: serde_json::Value = row.get("metadata");

    Ok(Transaction {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        session_id: row.get("session_id"),
        kind: TxKind::try_from(kind.as_str()).map_err(WardenError::Internal)?,
        status: TxStatus::try_from(status.as_str()).map_err(WardenError::Internal)?,
        tier: tier
            .as_deref()
            .map(Tier::try_from)
            .transpose()
            .map_err(WardenError::Internal)?,
        chain: chain.parse().map_err(WardenError::Internal)?,
        network: row.get("network"),
        from_address: row.get("from_address"),
        to_address: row.get("to_address"),
        amount: row.get("amount"),
        amount_usd: row.get("amount_usd"),
        tx_hash: row.get("tx_hash"),
        error_message: row.get("error_message"),
        reserved_amount: row.get("reserved_amount"),
        metadata: serde_json::from_value::<TxMetadata>(metadata)?,
        queued_at: row.get("queued_at"),
        executed_at: row.get("executed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_policy_row(row: &PgRow) -> Result<Policy> {
    let kind: String = row.get("kind");
    Ok(Policy {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        kind: PolicyKind::try_from(kind.as_str()).map_err(WardenError::Internal)?,
        rules: row.get("rules"),
        priority: row.get("priority"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Filter for transaction listings
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub wallet_id: Option<Uuid>,
    pub status: Option<TxStatus>,
    pub limit: Option<i64>,
}

/// Outcome of an atomic budget reservation attempt
#[derive(Debug, Clone)]
pub struct BudgetReservation {
    pub reserved: bool,
    pub in_flight: Decimal,
    pub window_spend: Decimal,
}
