//! USD value resolution for the five request shapes.
//!
//! Every request is priced before policy evaluation. A failed lookup
//! is never a zero value; zero would sail under every spending
//! threshold, so failures come back as their own outcomes.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::{BatchInstruction, ChainKind, TransactionRequest, TxKind};
use crate::error::{Result, WardenError};
use crate::oracle::{OracleError, PriceOracle, TokenRef};
use crate::validation::parse_base_amount;

/// Three-way pricing outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        usd_amount: Decimal,
        is_stale: bool,
    },
    /// Transient: the resolve step is safe to retry later.
    OracleDown { detail: String },
    /// Persistent registry gap; retrying does not help.
    NotListed {
        token_address: String,
        chain: ChainKind,
        /// BATCH only: how many instructions failed the lookup
        failed_count: Option<u32>,
    },
}

pub struct AmountResolver {
    oracle: Arc<dyn PriceOracle>,
}

impl AmountResolver {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self { oracle }
    }

    /// Price a request in USD.
    ///
    /// TRANSFER and value-bearing CONTRACT_CALL convert through the
    /// native price; TOKEN_TRANSFER looks the token up by address and
    /// decimals; APPROVE moves nothing and is always zero; BATCH sums
    /// its instructions against one native quote.
    pub async fn resolve(
        &self,
        request: &TransactionRequest,
        chain: ChainKind,
        network: Option<&str>,
    ) -> Result<Resolution> {
        match request {
            TransactionRequest::Transfer(req) => self.resolve_native(&req.amount, chain).await,
            TransactionRequest::TokenTransfer(req) => {
                let decimals = req.token_decimals.ok_or_else(|| {
                    WardenError::Validation("token transfer requires token_decimals".to_string())
                })?;
                self.resolve_token(&req.token, decimals, &req.amount, chain, network)
                    .await
            }
            TransactionRequest::ContractCall(req) => match req.value.as_deref() {
                Some(value) if value != "0" => self.resolve_native(value, chain).await,
                // A valueless call moves no funds.
                _ => Ok(Resolution::Resolved {
                    usd_amount: Decimal::ZERO,
                    is_stale: false,
                }),
            },
            TransactionRequest::Approve(_) => {
                // An approval grants allowance; nothing moves yet.
                Ok(Resolution::Resolved {
                    usd_amount: Decimal::ZERO,
                    is_stale: false,
                })
            }
            TransactionRequest::Batch(req) => {
                self.resolve_batch(&req.instructions, chain, network).await
            }
        }
    }

    async fn resolve_native(&self, amount: &str, chain: ChainKind) -> Result<Resolution> {
        let quote = match self.oracle.get_native_price(chain).await {
            Ok(quote) => quote,
            Err(e) => {
                return Ok(Resolution::OracleDown {
                    detail: e.to_string(),
                })
            }
        };
        let human = parse_base_amount(amount, chain.native_decimals())?;
        Ok(Resolution::Resolved {
            usd_amount: mul_usd(human, quote.usd_price)?,
            is_stale: quote.is_stale,
        })
    }

    async fn resolve_token(
        &self,
        token: &str,
        decimals: u32,
        amount: &str,
        chain: ChainKind,
        network: Option<&str>,
    ) -> Result<Resolution> {
        let token_ref = TokenRef {
            address: token.to_string(),
            decimals,
            chain,
            network: network.map(str::to_string),
        };
        let quote = match self.oracle.get_price(&token_ref).await {
            Ok(quote) => quote,
            Err(OracleError::PriceNotAvailable { .. }) => {
                return Ok(Resolution::NotListed {
                    token_address: token.to_string(),
                    chain,
                    failed_count: None,
                })
            }
            Err(e) => {
                return Ok(Resolution::OracleDown {
                    detail: e.to_string(),
                })
            }
        };
        let human = parse_base_amount(amount, decimals)?;
        Ok(Resolution::Resolved {
            usd_amount: mul_usd(human, quote.usd_price)?,
            is_stale: quote.is_stale,
        })
    }

    /// The native quote backs every TRANSFER and CONTRACT_CALL leg, so
    /// it is fetched once up front; losing it makes the whole batch
    /// unpriceable no matter what the instructions are.
    async fn resolve_batch(
        &self,
        instructions: &[BatchInstruction],
        chain: ChainKind,
        network: Option<&str>,
    ) -> Result<Resolution> {
        let native = match self.oracle.get_native_price(chain).await {
            Ok(quote) => quote,
            Err(e) => {
                return Ok(Resolution::OracleDown {
                    detail: e.to_string(),
                })
            }
        };

        let mut total = Decimal::ZERO;
        let mut is_stale = native.is_stale;
        let mut failed_count = 0u32;
        let mut first_not_listed: Option<String> = None;

        for instruction in instructions {
            match instruction.classify() {
                TxKind::Transfer => {
                    let amount = instruction.amount.as_deref().unwrap_or("0");
                    let human = parse_base_amount(amount, chain.native_decimals())?;
                    total = add_usd(total, mul_usd(human, native.usd_price)?)?;
                }
                TxKind::TokenTransfer => {
                    let address = instruction.token.as_deref().unwrap_or_default();
                    let decimals = instruction.token_decimals.ok_or_else(|| {
                        WardenError::Validation(
                            "batch token transfer requires token_decimals".to_string(),
                        )
                    })?;
                    let token_ref = TokenRef {
                        address: address.to_string(),
                        decimals,
                        chain,
                        network: network.map(str::to_string),
                    };
                    match self.oracle.get_price(&token_ref).await {
                        Ok(quote) => {
                            let amount = instruction.amount.as_deref().unwrap_or("0");
                            let human = parse_base_amount(amount, decimals)?;
                            total = add_usd(total, mul_usd(human, quote.usd_price)?)?;
                            if quote.is_stale {
                                is_stale = true;
                            }
                        }
                        Err(OracleError::PriceNotAvailable { .. }) => {
                            failed_count += 1;
                            if first_not_listed.is_none() {
                                first_not_listed = Some(address.to_string());
                            }
                        }
                        Err(e) => {
                            return Ok(Resolution::OracleDown {
                                detail: e.to_string(),
                            })
                        }
                    }
                }
                TxKind::ContractCall => {
                    if let Some(value) = instruction.value.as_deref() {
                        if value != "0" {
                            let human = parse_base_amount(value, chain.native_decimals())?;
                            total = add_usd(total, mul_usd(human, native.usd_price)?)?;
                        }
                    }
                }
                // Approvals contribute nothing; classify never yields
                // BATCH for an instruction.
                TxKind::Approve | TxKind::Batch => {}
            }
        }

        if failed_count > 0 {
            return Ok(Resolution::NotListed {
                token_address: first_not_listed.unwrap_or_default(),
                chain,
                failed_count: Some(failed_count),
            });
        }
        Ok(Resolution::Resolved {
            usd_amount: total,
            is_stale,
        })
    }
}

fn mul_usd(human_amount: Decimal, usd_price: Decimal) -> Result<Decimal> {
    human_amount
        .checked_mul(usd_price)
        .ok_or_else(|| WardenError::Validation("usd value out of range".to_string()))
}

fn add_usd(total: Decimal, usd: Decimal) -> Result<Decimal> {
    total
        .checked_add(usd)
        .ok_or_else(|| WardenError::Validation("usd value out of range".to_string()))
}
