use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Global kill switch state.
///
/// LOCKED is only reachable through SUSPENDED and only recovers to
/// ACTIVE, so an operator cannot jump straight from normal operation
/// to the hard-locked state or step a lock back down to suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KillSwitchState {
    Active,
    Suspended,
    Locked,
}

impl KillSwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSwitchState::Active => "ACTIVE",
            KillSwitchState::Suspended => "SUSPENDED",
            KillSwitchState::Locked => "LOCKED",
        }
    }

    /// Whether the pipeline is blocked in this state.
    pub fn is_engaged(&self) -> bool {
        !matches!(self, KillSwitchState::Active)
    }

    pub fn can_transition_to(&self, next: KillSwitchState) -> bool {
        use KillSwitchState::*;
        matches!(
            (self, next),
            (Active, Suspended) | (Suspended, Locked) | (Suspended, Active) | (Locked, Active)
        )
    }
}

impl std::fmt::Display for KillSwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for KillSwitchState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(KillSwitchState::Active),
            "SUSPENDED" => Ok(KillSwitchState::Suspended),
            "LOCKED" => Ok(KillSwitchState::Locked),
            other => Err(format!("unknown kill switch state: {}", other)),
        }
    }
}

/// The singleton kill switch row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitch {
    pub state: KillSwitchState,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_by: Option<String>,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use KillSwitchState::*;

    #[test]
    fn test_valid_edges() {
        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Locked));
        assert!(Suspended.can_transition_to(Active));
        assert!(Locked.can_transition_to(Active));
    }

    #[test]
    fn test_rejected_edges() {
        // Locking requires passing through SUSPENDED in both directions
        assert!(!Active.can_transition_to(Locked));
        assert!(!Locked.can_transition_to(Suspended));

        for state in [Active, Suspended, Locked] {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_engaged() {
        assert!(!Active.is_engaged());
        assert!(Suspended.is_engaged());
        assert!(Locked.is_engaged());
    }

    #[test]
    fn test_round_trip() {
        for state in [Active, Suspended, Locked] {
            assert_eq!(KillSwitchState::try_from(state.as_str()), Ok(state));
        }
        assert_eq!(KillSwitchState::try_from("suspended"), Ok(Suspended));
        assert!(KillSwitchState::try_from("HALTED").is_err());
    }
}
