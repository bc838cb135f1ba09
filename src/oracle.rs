//! Price oracle contract and the bundled Pyth Hermes implementation.
//!
//! The resolver only ever sees the [`PriceOracle`] trait. Failure splits
//! two ways and the split is load-bearing: `PriceNotAvailable` means the
//! token is not listed anywhere the oracle knows (a persistent registry
//! gap), while `Upstream` means the oracle itself is unreachable or
//! broken (transient). The two map to different pipeline outcomes.
//!
//! [`HermesOracle`] queries the public Pyth Hermes REST endpoint. It is
//! keyless and stateless: no cache, no fallback chain. Deployments that
//! need either put their own `PriceOracle` in front of the resolver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::ChainKind;
use crate::error::WardenError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub address: String,
    pub decimals: u32,
    pub chain: ChainKind,
    pub network: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub usd_price: Decimal,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Served past its freshness window. A stale price still resolves
    /// but forces at least the NOTIFY tier downstream.
    pub is_stale: bool,
}

#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("price not available for {token}")]
    PriceNotAvailable { token: String },

    #[error("oracle upstream failure: {0}")]
    Upstream(String),
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, token: &TokenRef) -> OracleResult<PriceQuote>;

    async fn get_native_price(&self, chain: ChainKind) -> OracleResult<PriceQuote>;
}

// ---------------------------------------------------------------------------
// Pyth Hermes
// ---------------------------------------------------------------------------

const HERMES_BASE_URL: &str = "https://hermes.pyth.network";
const HERMES_TIMEOUT_SECS: u64 = 5;
const PRICE_TTL_SECS: i64 = 300;

/// Hermes feed ids for native assets.
const NATIVE_FEEDS: &[(ChainKind, &str)] = &[
    (
        ChainKind::Solana,
        "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
    ),
    (
        ChainKind::Ethereum,
        "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
    ),
];

const USDC_FEED: &str = "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a";
const USDT_FEED: &str = "2b89b9dc8fdf9f34709a5b106b472f0f39bb6ca9ce04b0fd7f2e971688e2e53b";

/// Hermes feed ids keyed by mint/contract address. Anything not listed
/// here resolves as `PriceNotAvailable`.
const TOKEN_FEEDS: &[(ChainKind, &str, &str)] = &[
    (
        ChainKind::Solana,
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        USDC_FEED,
    ),
    (
        ChainKind::Solana,
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
        USDT_FEED,
    ),
    (
        ChainKind::Ethereum,
        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
        USDC_FEED,
    ),
    (
        ChainKind::Ethereum,
        "0xdac17f958d2ee523a2206206994597c13d831ec7",
        USDT_FEED,
    ),
];

fn native_feed(chain: ChainKind) -> Option<&'static str> {
    NATIVE_FEEDS
        .iter()
        .find_map(|(c, feed)| (*c == chain).then_some(*feed))
}

fn token_feed(chain: ChainKind, address: &str) -> Option<&'static str> {
    TOKEN_FEEDS.iter().find_map(|(c, addr, feed)| {
        // Solana mints are case-sensitive base58; EVM hex is not.
        let hit = *c == chain
            && match chain {
                ChainKind::Solana => *addr == address,
                ChainKind::Ethereum => addr.eq_ignore_ascii_case(address),
            };
        hit.then_some(*feed)
    })
}

#[derive(Debug, Deserialize)]
struct HermesResponse {
    parsed: Option<Vec<HermesFeed>>,
}

#[derive(Debug, Deserialize)]
struct HermesFeed {
    price: HermesPrice,
}

#[derive(Debug, Deserialize)]
struct HermesPrice {
    price: String,
    expo: i32,
}

/// Pyth Hermes REST client. One HTTPS GET per quote, 5s timeout, fixed
/// 5-minute freshness window on the returned quote.
pub struct HermesOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HermesOracle {
    pub fn new() -> crate::error::Result<Self> {
        Self::with_base_url(HERMES_BASE_URL)
    }

    /// Point at a different Hermes instance (self-hosted, test double).
    pub fn with_base_url(base_url: impl Into<String>) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HERMES_TIMEOUT_SECS))
            .build()
            .map_err(|e| WardenError::Internal(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_feed(&self, feed_id: &str) -> OracleResult<PriceQuote> {
        let url = format!(
            "{}/v2/updates/price/latest?ids[]=0x{}&parsed=true",
            self.base_url, feed_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Upstream(format!("hermes request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OracleError::Upstream(format!(
                "hermes returned {}",
                response.status()
            )));
        }

        let body: HermesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Upstream(format!("hermes response parse failed: {}", e)))?;

        let feed = body
            .parsed
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                OracleError::Upstream(format!("hermes returned no data for feed {}", feed_id))
            })?;

        let usd_price = decimal_from_mantissa(&feed.price)?;
        let fetched_at = Utc::now();

        debug!(feed = feed_id, price = %usd_price, "Hermes quote");

        Ok(PriceQuote {
            usd_price,
            source: "pyth".to_string(),
            fetched_at,
            expires_at: fetched_at + chrono::Duration::seconds(PRICE_TTL_SECS),
            is_stale: false,
        })
    }
}

/// Pyth prices arrive as an integer mantissa plus exponent
/// (`usd = mantissa * 10^expo`, expo typically -8).
fn decimal_from_mantissa(price: &HermesPrice) -> OracleResult<Decimal> {
    let mantissa: i128 = price
        .price
        .parse()
        .map_err(|_| OracleError::Upstream(format!("bad price mantissa: {}", price.price)))?;

    if price.expo <= 0 {
        Decimal::try_from_i128_with_scale(mantissa, price.expo.unsigned_abs())
            .map_err(|e| OracleError::Upstream(format!("price out of range: {}", e)))
    } else {
        let factor = 10i128
            .checked_pow(price.expo as u32)
            .ok_or_else(|| OracleError::Upstream(format!("price exponent too large: {}", price.expo)))?;
        let value = mantissa
            .checked_mul(factor)
            .ok_or_else(|| OracleError::Upstream("price overflow".to_string()))?;
        Decimal::try_from_i128_with_scale(value, 0)
            .map_err(|e| OracleError::Upstream(format!("price out of range: {}", e)))
    }
}

#[async_trait]
impl PriceOracle for HermesOracle {
    async fn get_price(&self, token: &TokenRef) -> OracleResult<PriceQuote> {
        let feed = token_feed(token.chain, &token.address).ok_or_else(|| {
            OracleError::PriceNotAvailable {
                token: format!("{}:{}", token.chain, token.address),
            }
        })?;
        self.fetch_feed(feed).await
    }

    async fn get_native_price(&self, chain: ChainKind) -> OracleResult<PriceQuote> {
        let feed = native_feed(chain).ok_or_else(|| OracleError::PriceNotAvailable {
            token: format!("{}:native", chain),
        })?;
        self.fetch_feed(feed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mantissa_conversion() {
        let price = HermesPrice {
            price: "6812345678".to_string(),
            expo: -8,
        };
        assert_eq!(decimal_from_mantissa(&price).unwrap(), dec!(68.12345678));

        let whole = HermesPrice {
            price: "42".to_string(),
            expo: 2,
        };
        assert_eq!(decimal_from_mantissa(&whole).unwrap(), dec!(4200));
    }

    #[test]
    fn test_mantissa_rejects_garbage() {
        let price = HermesPrice {
            price: "not-a-number".to_string(),
            expo: -8,
        };
        assert!(matches!(
            decimal_from_mantissa(&price),
            Err(OracleError::Upstream(_))
        ));
    }

    #[test]
    fn test_feed_lookup() {
        assert!(native_feed(ChainKind::Solana).is_some());
        assert!(native_feed(ChainKind::Ethereum).is_some());

        // EVM addresses match case-insensitively, Solana mints exactly.
        assert!(token_feed(
            ChainKind::Ethereum,
            "0xA0b86991C6218B36c1d19D4a2e9Eb0cE3606eB48"
        )
        .is_some());
        assert!(token_feed(
            ChainKind::Solana,
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        )
        .is_some());
        assert!(token_feed(
            ChainKind::Solana,
            "epjfwdd5aufqssqem2qn1xzybapc8g4weggkzwytdt1v"
        )
        .is_none());
        assert!(token_feed(ChainKind::Ethereum, "0xdeadbeef").is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_listed() {
        let oracle = HermesOracle::new().unwrap();
        let token = TokenRef {
            address: "UnknownMint1111111111111111111111111111111".to_string(),
            decimals: 6,
            chain: ChainKind::Solana,
            network: None,
        };
        // No feed mapping means no network call is attempted.
        assert!(matches!(
            oracle.get_price(&token).await,
            Err(OracleError::PriceNotAvailable { .. })
        ));
    }
}
