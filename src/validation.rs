/// Input validation for transaction requests
///
/// Amounts arrive as base-unit integer strings (lamports, wei) and are
/// never trusted as numbers until they pass through here. A value that
/// does not fit the decimal representation is rejected outright rather
/// than truncated.
use crate::domain::{
    BatchInstruction, ChainKind, TransactionRequest, TxKind, BATCH_MAX_INSTRUCTIONS,
    BATCH_MIN_INSTRUCTIONS,
};
use crate::error::{Result, WardenError};
use rust_decimal::Decimal;

/// Parse and bounds-check a base-unit amount string.
///
/// Returns the raw integer value so callers can re-scale it.
fn checked_digits(amount: &str, field_name: &str) -> Result<i128> {
    if amount.is_empty() {
        return Err(WardenError::Validation(format!(
            "{} cannot be empty",
            field_name
        )));
    }

    if !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WardenError::Validation(format!(
            "{} must be an unsigned integer in base units: {}",
            field_name, amount
        )));
    }

    amount.parse::<i128>().map_err(|_| {
        WardenError::Validation(format!("{} exceeds supported range: {}", field_name, amount))
    })
}

/// Validate a base-unit amount (must be a positive integer string)
///
/// # Arguments
/// * `amount` - Amount string in base units (e.g. lamports, wei)
/// * `field_name` - Name of the field for error messages
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err` if invalid
pub fn validate_base_amount(amount: &str, field_name: &str) -> Result<()> {
    let value = checked_digits(amount, field_name)?;

    if value == 0 {
        return Err(WardenError::Validation(format!(
            "{} must be greater than zero",
            field_name
        )));
    }

    Ok(())
}

/// Convert a base-unit amount string into a token-denominated decimal.
///
/// # Arguments
/// * `amount` - Amount string in base units
/// * `decimals` - Token decimal places (9 for SOL, 18 for ETH)
///
/// # Returns
/// * `Ok(Decimal)` scaled to token units
/// * `Err` if the amount is malformed or out of range
pub fn parse_base_amount(amount: &str, decimals: u32) -> Result<Decimal> {
    let value = checked_digits(amount, "amount")?;

    Decimal::try_from_i128_with_scale(value, decimals).map_err(|_| {
        WardenError::Validation(format!(
            "amount {} with {} decimals exceeds representable range",
            amount, decimals
        ))
    })
}

/// Validate an on-chain address for the given chain
///
/// # Arguments
/// * `address` - Address string to validate
/// * `chain` - Chain the address belongs to
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err` if invalid
pub fn validate_address(address: &str, chain: ChainKind) -> Result<()> {
    if address.is_empty() {
        return Err(WardenError::Validation("Address cannot be empty".to_string()));
    }

    match chain {
        ChainKind::Ethereum => {
            let hex_part = address.strip_prefix("0x").ok_or_else(|| {
                WardenError::Validation(format!("Ethereum address must start with 0x: {}", address))
            })?;

            if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(WardenError::Validation(format!(
                    "Invalid Ethereum address: {}",
                    address
                )));
            }
        }
        ChainKind::Solana => {
            // Base58 alphabet excludes 0, O, I and l
            let valid_charset = address
                .chars()
                .all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'));

            if address.len() < 32 || address.len() > 44 || !valid_charset {
                return Err(WardenError::Validation(format!(
                    "Invalid Solana address: {}",
                    address
                )));
            }
        }
    }

    Ok(())
}

fn validate_instruction(instruction: &BatchInstruction, chain: ChainKind, idx: usize) -> Result<()> {
    let field = format!("instructions[{}]", idx);

    match instruction.classify() {
        TxKind::Approve => {
            let spender = instruction.spender.as_deref().unwrap_or_default();
            let token = instruction.token.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: approval requires a token", field))
            })?;
            validate_address(spender, chain)?;
            validate_address(token, chain)?;
            let amount = instruction.amount.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: approval requires an amount", field))
            })?;
            validate_base_amount(amount, &format!("{}.amount", field))?;
        }
        TxKind::TokenTransfer => {
            let token = instruction.token.as_deref().unwrap_or_default();
            validate_address(token, chain)?;
            let to = instruction.to.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: transfer requires a destination", field))
            })?;
            validate_address(to, chain)?;
            let amount = instruction.amount.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: transfer requires an amount", field))
            })?;
            validate_base_amount(amount, &format!("{}.amount", field))?;
            // Decimals are part of the price-lookup key; a guessed
            // value would misprice the transfer.
            if instruction.token_decimals.is_none() {
                return Err(WardenError::Validation(format!(
                    "{}: token transfer requires token_decimals",
                    field
                )));
            }
        }
        TxKind::ContractCall => {
            if instruction.destination().is_none() {
                return Err(WardenError::Validation(format!(
                    "{}: contract call requires a target",
                    field
                )));
            }
            if let Some(to) = instruction.to.as_deref() {
                validate_address(to, chain)?;
            }
            if let Some(program_id) = instruction.program_id.as_deref() {
                validate_address(program_id, chain)?;
            }
            if let Some(value) = instruction.value.as_deref() {
                checked_digits(value, &format!("{}.value", field))?;
            }
        }
        TxKind::Transfer => {
            let to = instruction.to.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: transfer requires a destination", field))
            })?;
            validate_address(to, chain)?;
            let amount = instruction.amount.as_deref().ok_or_else(|| {
                WardenError::Validation(format!("{}: transfer requires an amount", field))
            })?;
            validate_base_amount(amount, &format!("{}.amount", field))?;
        }
        TxKind::Batch => {
            return Err(WardenError::Validation(format!(
                "{}: nested batches are not supported",
                field
            )));
        }
    }

    Ok(())
}

/// Validate a full transaction request before it enters the pipeline
///
/// # Arguments
/// * `request` - Parsed transaction request
/// * `chain` - Chain the request targets
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err` if invalid
pub fn validate_request(request: &TransactionRequest, chain: ChainKind) -> Result<()> {
    match request {
        TransactionRequest::Transfer(req) => {
            validate_address(&req.to, chain)?;
            validate_base_amount(&req.amount, "amount")?;
        }
        TransactionRequest::TokenTransfer(req) => {
            validate_address(&req.to, chain)?;
            validate_address(&req.token, chain)?;
            validate_base_amount(&req.amount, "amount")?;
            if req.token_decimals.is_none() {
                return Err(WardenError::Validation(
                    "Token transfer requires token_decimals".to_string(),
                ));
            }
        }
        TransactionRequest::ContractCall(req) => {
            if req.destination().is_none() {
                return Err(WardenError::Validation(
                    "Contract call requires a contract address or program id".to_string(),
                ));
            }
            if let Some(to) = req.to.as_deref() {
                validate_address(to, chain)?;
            }
            if let Some(program_id) = req.program_id.as_deref() {
                validate_address(program_id, chain)?;
            }
            // Zero value is a plain call, so only the format is checked
            if let Some(value) = req.value.as_deref() {
                checked_digits(value, "value")?;
            }
        }
        TransactionRequest::Approve(req) => {
            validate_address(&req.token, chain)?;
            validate_address(&req.spender, chain)?;
            validate_base_amount(&req.amount, "amount")?;
        }
        TransactionRequest::Batch(req) => {
            let count = req.instructions.len();
            if count < BATCH_MIN_INSTRUCTIONS || count > BATCH_MAX_INSTRUCTIONS {
                return Err(WardenError::Validation(format!(
                    "Batch must contain between {} and {} instructions, got {}",
                    BATCH_MIN_INSTRUCTIONS, BATCH_MAX_INSTRUCTIONS, count
                )));
            }
            for (idx, instruction) in req.instructions.iter().enumerate() {
                validate_instruction(instruction, chain, idx)?;
            }
        }
    }

    Ok(())
}
