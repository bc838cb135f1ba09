use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported chain families. Per-network variation (mainnet/devnet etc.)
/// rides in the free-form `network` field next to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Solana,
    Ethereum,
}

impl ChainKind {
    /// Decimals of the native unit (lamports, wei).
    pub fn native_decimals(&self) -> u32 {
        match self {
            ChainKind::Solana => 9,
            ChainKind::Ethereum => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Solana => "solana",
            ChainKind::Ethereum => "ethereum",
        }
    }
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solana" | "sol" => Ok(ChainKind::Solana),
            "ethereum" | "eth" | "evm" => Ok(ChainKind::Ethereum),
            other => Err(format!("unknown chain: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_decimals() {
        assert_eq!(ChainKind::Solana.native_decimals(), 9);
        assert_eq!(ChainKind::Ethereum.native_decimals(), 18);
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!(ChainKind::from_str("sol").unwrap(), ChainKind::Solana);
        assert_eq!(ChainKind::from_str("ETH").unwrap(), ChainKind::Ethereum);
        assert!(ChainKind::from_str("bitcoin").is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChainKind::Solana).unwrap(),
            "\"solana\""
        );
    }
}
