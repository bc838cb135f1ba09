use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{resolve_owner_state, ChainKind, OwnerState};

/// Wallet status. The kill-switch cascade suspends wallets; recovery
/// reactivates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletStatus {
    Active,
    Suspended,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "ACTIVE",
            WalletStatus::Suspended => "SUSPENDED",
        }
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for WalletStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(WalletStatus::Active),
            "SUSPENDED" => Ok(WalletStatus::Suspended),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// Wallet row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub label: String,
    pub chain: ChainKind,
    pub network: Option<String>,
    pub public_key: String,
    pub status: WalletStatus,
    pub owner_address: Option<String>,
    pub owner_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn owner_state(&self) -> OwnerState {
        resolve_owner_state(self.owner_address.as_deref(), self.owner_verified)
    }
}
