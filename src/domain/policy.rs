use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tier;
use crate::error::{Result, WardenError};

/// Policy kind. Evaluation order is fixed: WHITELIST, RATE_LIMIT,
/// TIME_RESTRICTION, then SPENDING_LIMIT assigns the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    SpendingLimit,
    Whitelist,
    RateLimit,
    TimeRestriction,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::SpendingLimit => "SPENDING_LIMIT",
            PolicyKind::Whitelist => "WHITELIST",
            PolicyKind::RateLimit => "RATE_LIMIT",
            PolicyKind::TimeRestriction => "TIME_RESTRICTION",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PolicyKind {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s.to_uppercase().as_str() {
            "SPENDING_LIMIT" => Ok(PolicyKind::SpendingLimit),
            "WHITELIST" => Ok(PolicyKind::Whitelist),
            "RATE_LIMIT" => Ok(PolicyKind::RateLimit),
            "TIME_RESTRICTION" => Ok(PolicyKind::TimeRestriction),
            other => Err(format!("unknown policy kind: {}", other)),
        }
    }
}

/// Policy row. `wallet_id` NULL means a global default; wallet-specific
/// policies override globals of the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub kind: PolicyKind,
    pub rules: serde_json::Value,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn spending_rules(&self) -> Result<SpendingLimitRules> {
        parse_rules(&self.rules, self.kind)
    }

    pub fn whitelist_rules(&self) -> Result<WhitelistRules> {
        parse_rules(&self.rules, self.kind)
    }

    pub fn rate_limit_rules(&self) -> Result<RateLimitRules> {
        parse_rules(&self.rules, self.kind)
    }

    pub fn time_restriction_rules(&self) -> Result<TimeRestrictionRules> {
        parse_rules(&self.rules, self.kind)
    }
}

fn parse_rules<T: serde::de::DeserializeOwned>(
    rules: &serde_json::Value,
    kind: PolicyKind,
) -> Result<T> {
    serde_json::from_value(rules.clone())
        .map_err(|e| WardenError::Validation(format!("invalid {} rules: {}", kind, e)))
}

/// SPENDING_LIMIT rules: three ascending USD thresholds plus the
/// optional overrides that ride with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingLimitRules {
    pub instant_max: Decimal,
    pub notify_max: Decimal,
    pub delay_max: Decimal,
    /// Cooldown override for DELAY-tier rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    /// Rolling 24h cumulative cap (reservations + confirmed spend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_cap_usd: Option<Decimal>,
    /// Approval window override for APPROVAL-tier rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_timeout_seconds: Option<i64>,
}

impl SpendingLimitRules {
    /// Strict threshold mapping: x < instant_max ⇒ INSTANT;
    /// instant_max ≤ x < notify_max ⇒ NOTIFY; notify_max ≤ x <
    /// delay_max ⇒ DELAY; x ≥ delay_max ⇒ APPROVAL.
    pub fn tier_for(&self, usd_amount: Decimal) -> Tier {
        if usd_amount < self.instant_max {
            Tier::Instant
        } else if usd_amount < self.notify_max {
            Tier::Notify
        } else if usd_amount < self.delay_max {
            Tier::Delay
        } else {
            Tier::Approval
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.instant_max <= Decimal::ZERO {
            return Err(WardenError::Validation(
                "instant_max must be positive".to_string(),
            ));
        }
        if !(self.instant_max < self.notify_max && self.notify_max < self.delay_max) {
            return Err(WardenError::Validation(format!(
                "spending thresholds must ascend: {} < {} < {}",
                self.instant_max, self.notify_max, self.delay_max
            )));
        }
        Ok(())
    }
}

/// WHITELIST rules. An empty list leaves that dimension unrestricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistRules {
    #[serde(default)]
    pub allowed_addresses: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

impl WhitelistRules {
    pub fn allows_address(&self, address: &str) -> bool {
        if self.allowed_addresses.is_empty() {
            return true;
        }
        self.allowed_addresses
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(address))
    }

    pub fn allows_domain(&self, domain: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        self.allowed_domains
            .iter()
            .any(|pattern| match_domain(pattern, domain))
    }
}

/// Case-insensitive domain match with a dot-boundary wildcard:
/// `*.example.com` matches any subdomain of example.com but never the
/// bare root, and `evilexample.com` never slips past the boundary.
pub fn match_domain(pattern: &str, target: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let target = target.to_lowercase();

    if pattern == target {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix("*.") {
        let suffix = format!(".{}", rest);
        return target.ends_with(&suffix) && target.len() > suffix.len();
    }
    false
}

/// RATE_LIMIT rules: at most `max_requests` transactions per wallet in
/// any trailing `window_seconds` window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRules {
    pub max_requests: u32,
    pub window_seconds: i64,
}

/// TIME_RESTRICTION rules: allowed UTC hours, half-open
/// [start_hour, end_hour), wrap-around permitted (22 → 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRestrictionRules {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl TimeRestrictionRules {
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour() as u8;
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(WardenError::Validation(format!(
                "hours must be 0-23: start={} end={}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_hour == self.end_hour {
            return Err(WardenError::Validation(
                "time restriction window is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn rules(a: Decimal, b: Decimal, c: Decimal) -> SpendingLimitRules {
        SpendingLimitRules {
            instant_max: a,
            notify_max: b,
            delay_max: c,
            delay_seconds: None,
            daily_cap_usd: None,
            approval_timeout_seconds: None,
        }
    }

    #[test]
    fn test_tier_thresholds_are_strict() {
        let r = rules(dec!(10000), dec!(100000), dec!(1000000));

        assert_eq!(r.tier_for(dec!(0)), Tier::Instant);
        assert_eq!(r.tier_for(dec!(9999.99)), Tier::Instant);
        // Exactly at a threshold escalates
        assert_eq!(r.tier_for(dec!(10000)), Tier::Notify);
        assert_eq!(r.tier_for(dec!(99999.99)), Tier::Notify);
        assert_eq!(r.tier_for(dec!(100000)), Tier::Delay);
        assert_eq!(r.tier_for(dec!(999999.99)), Tier::Delay);
        assert_eq!(r.tier_for(dec!(1000000)), Tier::Approval);
        assert_eq!(r.tier_for(dec!(50000000)), Tier::Approval);
    }

    #[test]
    fn test_thresholds_must_ascend() {
        assert!(rules(dec!(10), dec!(100), dec!(1000)).validate().is_ok());
        assert!(rules(dec!(100), dec!(100), dec!(1000)).validate().is_err());
        assert!(rules(dec!(1000), dec!(100), dec!(10)).validate().is_err());
        assert!(rules(dec!(0), dec!(100), dec!(1000)).validate().is_err());
    }

    #[test]
    fn test_wildcard_domain_matching() {
        // Exact match
        assert!(match_domain("example.com", "example.com"));
        assert!(match_domain("Example.COM", "example.com"));

        // Wildcard matches subdomains only
        assert!(match_domain("*.example.com", "api.example.com"));
        assert!(match_domain("*.example.com", "a.b.example.com"));
        assert!(!match_domain("*.example.com", "example.com"));

        // Dot boundary holds
        assert!(!match_domain("*.example.com", "evilexample.com"));
        assert!(!match_domain("example.com", "notexample.com"));
    }

    #[test]
    fn test_whitelist_empty_means_unrestricted() {
        let rules = WhitelistRules::default();
        assert!(rules.allows_address("anything"));
        assert!(rules.allows_domain("anywhere.com"));
    }

    #[test]
    fn test_whitelist_address_case_insensitive() {
        let rules = WhitelistRules {
            allowed_addresses: vec!["0xAbCd".to_string()],
            allowed_domains: vec![],
        };
        assert!(rules.allows_address("0xabcd"));
        assert!(rules.allows_address("0xABCD"));
        assert!(!rules.allows_address("0xother"));
    }

    #[test]
    fn test_time_restriction_window() {
        let day = TimeRestrictionRules {
            start_hour: 9,
            end_hour: 17,
        };
        let at = |h: u32| Utc.with_ymd_and_hms(2025, 6, 1, h, 30, 0).unwrap();
        assert!(day.allows(at(9)));
        assert!(day.allows(at(16)));
        assert!(!day.allows(at(17)));
        assert!(!day.allows(at(3)));

        let night = TimeRestrictionRules {
            start_hour: 22,
            end_hour: 6,
        };
        assert!(night.allows(at(23)));
        assert!(night.allows(at(2)));
        assert!(!night.allows(at(12)));
    }

    #[test]
    fn test_rules_parse_from_policy_row() {
        let now = Utc::now();
        let policy = Policy {
            id: Uuid::new_v4(),
            wallet_id: None,
            kind: PolicyKind::SpendingLimit,
            rules: serde_json::json!({
                "instant_max": "10000",
                "notify_max": "100000",
                "delay_max": "1000000",
                "delay_seconds": 300
            }),
            priority: 0,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        let rules = policy.spending_rules().unwrap();
        assert_eq!(rules.instant_max, dec!(10000));
        assert_eq!(rules.delay_seconds, Some(300));
        assert_eq!(rules.daily_cap_usd, None);
    }
}
