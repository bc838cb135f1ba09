use serde::{Deserialize, Serialize};

use super::Tier;

/// Owner binding strength. Derived from the wallet row, never stored.
///
/// NONE: no external owner bound. GRACE: an owner address is set but its
/// control has not been proven. LOCKED: ownership verified; owner-bound
/// operations are now enforceable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OwnerState {
    None,
    Grace,
    Locked,
}

impl OwnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerState::None => "NONE",
            OwnerState::Grace => "GRACE",
            OwnerState::Locked => "LOCKED",
        }
    }
}

impl std::fmt::Display for OwnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pure derivation from the two wallet columns.
pub fn resolve_owner_state(owner_address: Option<&str>, owner_verified: bool) -> OwnerState {
    match owner_address {
        None => OwnerState::None,
        Some(_) if owner_verified => OwnerState::Locked,
        Some(_) => OwnerState::Grace,
    }
}

/// APPROVAL requires a human channel; a wallet with no owner has none.
/// Blocking forever would strand funds, so the tier drops to DELAY and
/// a timed cooldown still protects them. Every other (state, tier)
/// combination passes through unchanged.
pub fn downgrade_if_no_owner(state: OwnerState, tier: Tier) -> (Tier, bool) {
    match (state, tier) {
        (OwnerState::None, Tier::Approval) => (Tier::Delay, true),
        (_, tier) => (tier, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_owner_state() {
        assert_eq!(resolve_owner_state(None, false), OwnerState::None);
        // Verified flag without an address still means no owner
        assert_eq!(resolve_owner_state(None, true), OwnerState::None);
        assert_eq!(resolve_owner_state(Some("0xabc"), false), OwnerState::Grace);
        assert_eq!(resolve_owner_state(Some("0xabc"), true), OwnerState::Locked);
    }

    #[test]
    fn test_downgrade_matrix() {
        assert_eq!(
            downgrade_if_no_owner(OwnerState::None, Tier::Approval),
            (Tier::Delay, true)
        );

        // Everything else passes through untouched
        for state in [OwnerState::None, OwnerState::Grace, OwnerState::Locked] {
            for tier in [Tier::Instant, Tier::Notify, Tier::Delay] {
                assert_eq!(downgrade_if_no_owner(state, tier), (tier, false));
            }
        }
        assert_eq!(
            downgrade_if_no_owner(OwnerState::Grace, Tier::Approval),
            (Tier::Approval, false)
        );
        assert_eq!(
            downgrade_if_no_owner(OwnerState::Locked, Tier::Approval),
            (Tier::Approval, false)
        );
    }
}
