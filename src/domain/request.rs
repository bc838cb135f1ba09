use serde::{Deserialize, Serialize};

use super::TxKind;
use crate::error::{Result, WardenError};

/// Batch size bounds. A batch of one is a plain request in disguise;
/// an unbounded batch is a griefing vector.
pub const BATCH_MIN_INSTRUCTIONS: usize = 2;
pub const BATCH_MAX_INSTRUCTIONS: usize = 20;

/// Native transfer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    /// Base units, decimal-string
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Token (SPL / ERC-20) transfer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransferRequest {
    pub to: String,
    /// Token mint / contract address
    pub token: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u32>,
}

/// Arbitrary contract/program invocation. EVM callers set `to` +
/// `calldata`; Solana callers set `program_id` (+ optional `calldata`
/// as serialized instruction data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
    /// Native value attached to the call, base units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Origin domain of the dapp that produced this call, if the
    /// caller declares one. Checked against domain whitelists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ContractCallRequest {
    pub fn destination(&self) -> Option<&str> {
        self.to.as_deref().or(self.program_id.as_deref())
    }
}

/// Token spending approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub token: String,
    pub spender: String,
    pub amount: String,
}

/// One instruction inside a BATCH. The shape is open; `classify`
/// decides what it is by field presence, in fixed precedence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchInstruction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl BatchInstruction {
    /// Field-presence classification: `spender` marks an APPROVE,
    /// `token` a TOKEN_TRANSFER, `program_id`/`calldata` a
    /// CONTRACT_CALL, anything else a TRANSFER.
    pub fn classify(&self) -> TxKind {
        if self.spender.is_some() {
            TxKind::Approve
        } else if self.token.is_some() {
            TxKind::TokenTransfer
        } else if self.program_id.is_some() || self.calldata.is_some() {
            TxKind::ContractCall
        } else {
            TxKind::Transfer
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self.classify() {
            TxKind::Approve => self.spender.as_deref(),
            TxKind::ContractCall => self.to.as_deref().or(self.program_id.as_deref()),
            _ => self.to.as_deref(),
        }
    }
}

/// Batch request: 2-20 instructions executed as one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub instructions: Vec<BatchInstruction>,
}

/// The 5-shape request union, tagged by `type`. An untagged legacy
/// `{to, amount}` body is accepted and coerced to TRANSFER.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionRequest {
    Transfer(TransferRequest),
    TokenTransfer(TokenTransferRequest),
    ContractCall(ContractCallRequest),
    Approve(ApproveRequest),
    Batch(BatchRequest),
}

impl TransactionRequest {
    /// Parse an incoming JSON body. Schema violations come back as
    /// ValidationError; nothing is persisted by this step.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if value.get("type").is_some() {
            serde_json::from_value(value)
                .map_err(|e| WardenError::Validation(format!("malformed request: {}", e)))
        } else if value.get("to").is_some() && value.get("amount").is_some() {
            let legacy: TransferRequest = serde_json::from_value(value)
                .map_err(|e| WardenError::Validation(format!("malformed legacy request: {}", e)))?;
            Ok(TransactionRequest::Transfer(legacy))
        } else {
            Err(WardenError::Validation(
                "request must carry a type tag or a legacy {to, amount} shape".to_string(),
            ))
        }
    }

    pub fn kind(&self) -> TxKind {
        match self {
            TransactionRequest::Transfer(_) => TxKind::Transfer,
            TransactionRequest::TokenTransfer(_) => TxKind::TokenTransfer,
            TransactionRequest::ContractCall(_) => TxKind::ContractCall,
            TransactionRequest::Approve(_) => TxKind::Approve,
            TransactionRequest::Batch(_) => TxKind::Batch,
        }
    }

    /// Primary destination recorded on the transaction row. BATCH has
    /// no single destination.
    pub fn destination(&self) -> Option<&str> {
        match self {
            TransactionRequest::Transfer(r) => Some(r.to.as_str()),
            TransactionRequest::TokenTransfer(r) => Some(r.to.as_str()),
            TransactionRequest::ContractCall(r) => r.destination(),
            TransactionRequest::Approve(r) => Some(r.spender.as_str()),
            TransactionRequest::Batch(_) => None,
        }
    }

    /// Every destination the request touches; whitelist evaluation
    /// checks all of them.
    pub fn destinations(&self) -> Vec<&str> {
        match self {
            TransactionRequest::Batch(r) => r
                .instructions
                .iter()
                .filter_map(|ix| ix.destination())
                .collect(),
            other => other.destination().into_iter().collect(),
        }
    }

    /// Declared dapp origin, if any. Only CONTRACT_CALL carries one.
    pub fn domain(&self) -> Option<&str> {
        match self {
            TransactionRequest::ContractCall(r) => r.domain.as_deref(),
            _ => None,
        }
    }

    /// Base-unit amount recorded on the row ("0" where no single
    /// amount applies).
    pub fn amount(&self) -> &str {
        match self {
            TransactionRequest::Transfer(r) => r.amount.as_str(),
            TransactionRequest::TokenTransfer(r) => r.amount.as_str(),
            TransactionRequest::ContractCall(r) => r.value.as_deref().unwrap_or("0"),
            TransactionRequest::Approve(r) => r.amount.as_str(),
            TransactionRequest::Batch(_) => "0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_parse() {
        let req = TransactionRequest::from_json(json!({
            "type": "TOKEN_TRANSFER",
            "to": "recipient",
            "token": "mint",
            "amount": "1000",
            "token_decimals": 6
        }))
        .unwrap();
        assert_eq!(req.kind(), TxKind::TokenTransfer);
        assert_eq!(req.destination(), Some("recipient"));
        assert_eq!(req.amount(), "1000");
    }

    #[test]
    fn test_legacy_body_coerces_to_transfer() {
        let req = TransactionRequest::from_json(json!({
            "to": "recipient",
            "amount": "5000"
        }))
        .unwrap();
        assert_eq!(req.kind(), TxKind::Transfer);
        assert_eq!(req.amount(), "5000");
    }

    #[test]
    fn test_untyped_unrecognized_body_is_rejected() {
        let err = TransactionRequest::from_json(json!({ "foo": "bar" })).unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        let err = TransactionRequest::from_json(json!({
            "type": "STAKE",
            "to": "x",
            "amount": "1"
        }))
        .unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[test]
    fn test_instruction_classification_precedence() {
        let approve = BatchInstruction {
            spender: Some("s".into()),
            token: Some("t".into()),
            ..Default::default()
        };
        // spender wins over token
        assert_eq!(approve.classify(), TxKind::Approve);

        let token = BatchInstruction {
            token: Some("t".into()),
            to: Some("r".into()),
            ..Default::default()
        };
        assert_eq!(token.classify(), TxKind::TokenTransfer);

        let call = BatchInstruction {
            calldata: Some("0xdeadbeef".into()),
            to: Some("c".into()),
            ..Default::default()
        };
        assert_eq!(call.classify(), TxKind::ContractCall);

        let transfer = BatchInstruction {
            to: Some("r".into()),
            amount: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(transfer.classify(), TxKind::Transfer);
    }

    #[test]
    fn test_batch_destinations_cover_all_instructions() {
        let req = TransactionRequest::Batch(BatchRequest {
            instructions: vec![
                BatchInstruction {
                    to: Some("a".into()),
                    amount: Some("1".into()),
                    ..Default::default()
                },
                BatchInstruction {
                    spender: Some("b".into()),
                    token: Some("t".into()),
                    amount: Some("2".into()),
                    ..Default::default()
                },
            ],
        });
        assert_eq!(req.destinations(), vec!["a", "b"]);
        assert_eq!(req.destination(), None);
    }
}
