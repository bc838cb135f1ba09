use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adapters::{BudgetReservation, PostgresStore};
use crate::domain::{downgrade_if_no_owner, Policy, PolicyKind, Tier, TransactionRequest, Wallet};
use crate::error::{Result, WardenError};

/// Engine defaults, overridable per SPENDING_LIMIT policy.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Cooldown for DELAY-tier transactions, seconds
    pub default_delay_seconds: i64,
    /// Approval window for APPROVAL-tier transactions, seconds
    pub default_approval_timeout_seconds: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_delay_seconds: 300,
            default_approval_timeout_seconds: 3600,
        }
    }
}

/// Outcome of a successful evaluation. A denied transaction never gets
/// a decision; it comes back as `PolicyDenied`.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub tier: Tier,
    pub delay_seconds: i64,
    pub approval_timeout_seconds: i64,
    /// APPROVAL fell back to DELAY because the wallet has no owner.
    pub downgraded: bool,
    pub reservation: BudgetReservation,
}

/// Evaluates the merged policy set against a priced transaction and,
/// when it passes, reserves its USD amount against the wallet budget
/// in the same step. Checks run in fixed order: whitelist, rate limit,
/// time restriction, spending limit.
#[derive(Clone)]
pub struct PolicyEngine {
    store: PostgresStore,
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(store: PostgresStore, config: PolicyConfig) -> Self {
        Self { store, config }
    }

    /// Evaluate `request` for `wallet` and reserve the budget hold.
    ///
    /// The transaction row must already exist in PENDING with its USD
    /// amount resolved; the reservation step stamps the decided tier
    /// onto it. Deny paths leave the row untouched for the caller to
    /// fail.
    pub async fn evaluate_and_reserve(
        &self,
        wallet: &Wallet,
        tx_id: Uuid,
        request: &TransactionRequest,
        usd_amount: Decimal,
        is_stale: bool,
    ) -> Result<PolicyDecision> {
        let policies = self.store.get_policies_for_wallet(wallet.id).await?;
        let merged = merge_policies(&policies);

        if let Some(policy) = merged.whitelist {
            check_whitelist(policy, request)
                .map_err(|e| log_denied(wallet.id, tx_id, e))?;
        }

        if let Some(policy) = merged.rate_limit {
            let rules = policy.rate_limit_rules()?;
            let since = Utc::now() - Duration::seconds(rules.window_seconds);
            let count = self.store.count_recent_transactions(wallet.id, since).await?;
            // The row under evaluation is already inserted, so it is
            // part of the count.
            if count > rules.max_requests as i64 {
                let reason = format!(
                    "rate limit exceeded: {} requests in {}s window (max {})",
                    count, rules.window_seconds, rules.max_requests
                );
                return Err(log_denied(
                    wallet.id,
                    tx_id,
                    WardenError::PolicyDenied { reason },
                ));
            }
        }

        if let Some(policy) = merged.time_restriction {
            let rules = policy.time_restriction_rules()?;
            if !rules.allows(Utc::now()) {
                let reason = format!(
                    "outside allowed hours {:02}:00-{:02}:00 UTC",
                    rules.start_hour, rules.end_hour
                );
                return Err(log_denied(
                    wallet.id,
                    tx_id,
                    WardenError::PolicyDenied { reason },
                ));
            }
        }

        let terms = spending_terms(merged.spending, &self.config, usd_amount, is_stale)?;
        let (tier, downgraded) = downgrade_if_no_owner(wallet.owner_state(), terms.tier);
        if downgraded {
            warn!(
                wallet_id = %wallet.id,
                tx_id = %tx_id,
                "no owner connected, APPROVAL falls back to DELAY"
            );
        }

        let reservation = self
            .store
            .reserve_budget(
                wallet.id,
                tx_id,
                usd_amount,
                tier,
                terms.daily_cap_usd,
                Duration::hours(24),
            )
            .await?;
        if !reservation.reserved {
            let cap = terms.daily_cap_usd.unwrap_or(Decimal::ZERO);
            let reason = format!(
                "daily cap exceeded: {} in flight + {} spent in window + {} requested > {} cap",
                reservation.in_flight, reservation.window_spend, usd_amount, cap
            );
            return Err(log_denied(
                wallet.id,
                tx_id,
                WardenError::PolicyDenied { reason },
            ));
        }

        debug!(
            wallet_id = %wallet.id,
            tx_id = %tx_id,
            tier = %tier,
            usd = %usd_amount,
            stale = is_stale,
            "policy evaluation passed"
        );
        Ok(PolicyDecision {
            tier,
            delay_seconds: terms.delay_seconds,
            approval_timeout_seconds: terms.approval_timeout_seconds,
            downgraded,
            reservation,
        })
    }
}

fn log_denied(wallet_id: Uuid, tx_id: Uuid, err: WardenError) -> WardenError {
    if let WardenError::PolicyDenied { reason } = &err {
        warn!(wallet_id = %wallet_id, tx_id = %tx_id, reason = %reason, "transaction denied by policy");
    }
    err
}

/// Effective policy per kind. The store hands back wallet-specific
/// rows before globals, so the first row of each kind wins.
struct MergedPolicies<'a> {
    spending: Option<&'a Policy>,
    whitelist: Option<&'a Policy>,
    rate_limit: Option<&'a Policy>,
    time_restriction: Option<&'a Policy>,
}

fn merge_policies(policies: &[Policy]) -> MergedPolicies<'_> {
    let mut merged = MergedPolicies {
        spending: None,
        whitelist: None,
        rate_limit: None,
        time_restriction: None,
    };
    for policy in policies {
        let slot = match policy.kind {
            PolicyKind::SpendingLimit => &mut merged.spending,
            PolicyKind::Whitelist => &mut merged.whitelist,
            PolicyKind::RateLimit => &mut merged.rate_limit,
            PolicyKind::TimeRestriction => &mut merged.time_restriction,
        };
        if slot.is_none() {
            *slot = Some(policy);
        }
    }
    merged
}

/// Every destination is checked against the address list; a declared
/// dapp domain is checked against the domain list. An empty list
/// leaves its dimension unrestricted.
fn check_whitelist(policy: &Policy, request: &TransactionRequest) -> Result<()> {
    let rules = policy.whitelist_rules()?;
    for dest in request.destinations() {
        if !rules.allows_address(dest) {
            return Err(WardenError::PolicyDenied {
                reason: format!("destination not whitelisted: {}", dest),
            });
        }
    }
    if let Some(domain) = request.domain() {
        if !rules.allows_domain(domain) {
            return Err(WardenError::PolicyDenied {
                reason: format!("domain not whitelisted: {}", domain),
            });
        }
    }
    Ok(())
}

struct SpendingTerms {
    tier: Tier,
    delay_seconds: i64,
    approval_timeout_seconds: i64,
    daily_cap_usd: Option<Decimal>,
}

/// Tier selection plus the timing overrides that ride with the
/// spending policy. No SPENDING_LIMIT policy means nothing to tier
/// against, so the transaction rides INSTANT. A stale quote can
/// understate value and never stays INSTANT.
fn spending_terms(
    policy: Option<&Policy>,
    config: &PolicyConfig,
    usd_amount: Decimal,
    is_stale: bool,
) -> Result<SpendingTerms> {
    let mut terms = match policy {
        Some(policy) => {
            let rules = policy.spending_rules()?;
            SpendingTerms {
                tier: rules.tier_for(usd_amount),
                delay_seconds: rules
                    .delay_seconds
                    .unwrap_or(config.default_delay_seconds),
                approval_timeout_seconds: rules
                    .approval_timeout_seconds
                    .unwrap_or(config.default_approval_timeout_seconds),
                daily_cap_usd: rules.daily_cap_usd,
            }
        }
        None => SpendingTerms {
            tier: Tier::Instant,
            delay_seconds: config.default_delay_seconds,
            approval_timeout_seconds: config.default_approval_timeout_seconds,
            daily_cap_usd: None,
        },
    };
    if is_stale {
        terms.tier = terms.tier.max(Tier::Notify);
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractCallRequest, TransferRequest};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn policy(kind: PolicyKind, wallet_id: Option<Uuid>, rules: serde_json::Value) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            wallet_id,
            kind,
            rules,
            priority: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn spending_policy(rules: serde_json::Value) -> Policy {
        policy(PolicyKind::SpendingLimit, None, rules)
    }

    #[test]
    fn test_merge_first_per_kind_wins() {
        let wallet_id = Uuid::new_v4();
        let wallet_specific = policy(
            PolicyKind::SpendingLimit,
            Some(wallet_id),
            json!({ "instant_max": "50", "notify_max": "500", "delay_max": "5000" }),
        );
        let global = spending_policy(
            json!({ "instant_max": "10000", "notify_max": "100000", "delay_max": "1000000" }),
        );
        let whitelist = policy(
            PolicyKind::Whitelist,
            None,
            json!({ "allowed_addresses": ["addr"] }),
        );

        // Store order: wallet-specific rows come first.
        let policies = vec![wallet_specific.clone(), global, whitelist];
        let merged = merge_policies(&policies);

        assert_eq!(merged.spending.unwrap().id, wallet_specific.id);
        assert!(merged.whitelist.is_some());
        assert!(merged.rate_limit.is_none());
        assert!(merged.time_restriction.is_none());
    }

    #[test]
    fn test_spending_terms_tiers() {
        let policy = spending_policy(
            json!({ "instant_max": "10000", "notify_max": "100000", "delay_max": "1000000" }),
        );
        let config = PolicyConfig::default();

        let cases = [
            (dec!(9999.99), Tier::Instant),
            (dec!(10000), Tier::Notify),
            (dec!(99999.99), Tier::Notify),
            (dec!(100000), Tier::Delay),
            (dec!(999999.99), Tier::Delay),
            (dec!(1000000), Tier::Approval),
        ];
        for (usd, expected) in cases {
            let terms = spending_terms(Some(&policy), &config, usd, false).unwrap();
            assert_eq!(terms.tier, expected, "usd={}", usd);
        }
    }

    #[test]
    fn test_spending_terms_defaults_and_overrides() {
        let config = PolicyConfig::default();

        let bare = spending_policy(
            json!({ "instant_max": "100", "notify_max": "1000", "delay_max": "10000" }),
        );
        let terms = spending_terms(Some(&bare), &config, dec!(50), false).unwrap();
        assert_eq!(terms.delay_seconds, 300);
        assert_eq!(terms.approval_timeout_seconds, 3600);
        assert!(terms.daily_cap_usd.is_none());

        let overridden = spending_policy(json!({
            "instant_max": "100",
            "notify_max": "1000",
            "delay_max": "10000",
            "delay_seconds": 600,
            "approval_timeout_seconds": 7200,
            "daily_cap_usd": "50000"
        }));
        let terms = spending_terms(Some(&overridden), &config, dec!(50), false).unwrap();
        assert_eq!(terms.delay_seconds, 600);
        assert_eq!(terms.approval_timeout_seconds, 7200);
        assert_eq!(terms.daily_cap_usd, Some(dec!(50000)));
    }

    #[test]
    fn test_no_spending_policy_rides_instant() {
        let config = PolicyConfig::default();
        let terms = spending_terms(None, &config, dec!(5000000), false).unwrap();
        assert_eq!(terms.tier, Tier::Instant);
        assert_eq!(terms.delay_seconds, 300);
        assert_eq!(terms.approval_timeout_seconds, 3600);
    }

    #[test]
    fn test_stale_price_clamps_to_notify() {
        let policy = spending_policy(
            json!({ "instant_max": "10000", "notify_max": "100000", "delay_max": "1000000" }),
        );
        let config = PolicyConfig::default();

        let terms = spending_terms(Some(&policy), &config, dec!(5), true).unwrap();
        assert_eq!(terms.tier, Tier::Notify);

        // Higher tiers are untouched by staleness.
        let terms = spending_terms(Some(&policy), &config, dec!(2000000), true).unwrap();
        assert_eq!(terms.tier, Tier::Approval);

        let terms = spending_terms(None, &config, dec!(5), true).unwrap();
        assert_eq!(terms.tier, Tier::Notify);
    }

    #[test]
    fn test_whitelist_checks_addresses_and_domain() {
        let wl = policy(
            PolicyKind::Whitelist,
            None,
            json!({
                "allowed_addresses": ["0xAbC0000000000000000000000000000000000001"],
                "allowed_domains": ["*.example.com"]
            }),
        );

        let allowed = TransactionRequest::Transfer(TransferRequest {
            to: "0xabc0000000000000000000000000000000000001".to_string(),
            amount: "1".to_string(),
            memo: None,
        });
        assert!(check_whitelist(&wl, &allowed).is_ok());

        let blocked = TransactionRequest::Transfer(TransferRequest {
            to: "0xdead000000000000000000000000000000000002".to_string(),
            amount: "1".to_string(),
            memo: None,
        });
        let err = check_whitelist(&wl, &blocked).unwrap_err();
        assert!(matches!(err, WardenError::PolicyDenied { .. }));

        let call = TransactionRequest::ContractCall(ContractCallRequest {
            to: Some("0xabc0000000000000000000000000000000000001".to_string()),
            program_id: None,
            calldata: Some("0x00".to_string()),
            value: None,
            domain: Some("api.example.com".to_string()),
        });
        assert!(check_whitelist(&wl, &call).is_ok());

        let bad_domain = TransactionRequest::ContractCall(ContractCallRequest {
            to: Some("0xabc0000000000000000000000000000000000001".to_string()),
            program_id: None,
            calldata: Some("0x00".to_string()),
            value: None,
            domain: Some("evil.com".to_string()),
        });
        assert!(check_whitelist(&wl, &bad_domain).is_err());
    }

    #[test]
    fn test_empty_whitelist_dimension_is_unrestricted() {
        let wl = policy(
            PolicyKind::Whitelist,
            None,
            json!({ "allowed_domains": ["*.example.com"] }),
        );
        // No address list configured: any destination passes, the
        // domain list still binds.
        let transfer = TransactionRequest::Transfer(TransferRequest {
            to: "anywhere".to_string(),
            amount: "1".to_string(),
            memo: None,
        });
        assert!(check_whitelist(&wl, &transfer).is_ok());

        let call = TransactionRequest::ContractCall(ContractCallRequest {
            to: Some("anywhere".to_string()),
            program_id: None,
            calldata: None,
            value: None,
            domain: Some("phish.net".to_string()),
        });
        assert!(check_whitelist(&wl, &call).is_err());
    }
}
