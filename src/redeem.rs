//! Redemption calldata for the Conditional Token Framework (CTF)
//!
//! Winnings in a resolved market are claimed by calling redeemPositions on
//! the CTF contract. The relay has no dedicated /redeem endpoint: it takes
//! an ABI-encoded contract call wrapped in a signed Safe transaction, so
//! this module only produces the `{to, data, value}` payload; signing and
//! submission live in the relay service.

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// CTF contract on Polygon. MUST target this directly (not NegRisk Adapter)
pub const CTF_ADDRESS: &str = "0x4d97dcd97ec945f40cf65f87097ace5ea0476045";
/// USDC on Polygon (6 decimals)
pub const USDC_ADDRESS: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";
pub const CHAIN_ID: u64 = 137;

// CTF contract function signature for ABI encoding
sol! {
    function redeemPositions(
        address collateralToken,
        bytes32 parentCollectionId,
        bytes32 conditionId,
        uint256[] indexSets
    );
}

/// One market's redemption, in the shape the relay submits on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemTx {
    pub to: String,
    pub data: String,
    pub value: String,
}

impl RedeemTx {
    /// Calldata as raw bytes, for hashing and signing
    pub fn data_bytes(&self) -> Result<Vec<u8>> {
        let hex_str = self.data.strip_prefix("0x").unwrap_or(&self.data);
        hex::decode(hex_str).context("Invalid redemption calldata hex")
    }
}

/// Normalize a condition id to its 32-byte form: strip the 0x, lowercase,
/// left-pad short ids. Non-hex, odd-length and over-length ids are errors;
/// a silently mangled id would redeem the wrong market.
pub fn parse_condition_id(condition_id: &str) -> Result<B256> {
    let hex_str = condition_id.trim().to_lowercase();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(&hex_str);

    if hex_str.is_empty() {
        anyhow::bail!("Empty condition ID");
    }
    if hex_str.len() > 64 {
        anyhow::bail!(
            "Condition ID must be at most 32 bytes, got {} hex chars",
            hex_str.len()
        );
    }

    // hex::decode rejects both non-hex characters and odd lengths
    let bytes = hex::decode(hex_str).context("Invalid condition ID hex")?;
    Ok(B256::left_padding_from(&bytes))
}

/// Build the redemption payload for one market.
///
/// Encodes `redeemPositions(USDC, 0x0, conditionId, [1, 2])`. The index
/// sets cover both outcome slots of a binary market, so one call redeems
/// whichever legs the account holds. Deterministic: the same id always
/// yields byte-identical calldata.
pub fn build_redeem_tx(condition_id: &str) -> Result<RedeemTx> {
    let cond_bytes = parse_condition_id(condition_id)?;
    let usdc: Address = USDC_ADDRESS.parse()?;

    let call = redeemPositionsCall {
        collateralToken: usdc,
        parentCollectionId: B256::ZERO,
        conditionId: cond_bytes,
        indexSets: vec![U256::from(1), U256::from(2)],
    };

    Ok(RedeemTx {
        to: CTF_ADDRESS.to_string(),
        data: format!("0x{}", hex::encode(call.abi_encode())),
        value: "0".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COND: &str = "0x1234567890123456789012345678901234567890123456789012345678901234";

    #[test]
    fn test_build_is_deterministic() {
        let a = build_redeem_tx(COND).unwrap();
        let b = build_redeem_tx(COND).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to, CTF_ADDRESS);
        assert_eq!(a.value, "0");
    }

    #[test]
    fn test_build_uses_redeem_selector() {
        let tx = build_redeem_tx(COND).unwrap();
        // keccak("redeemPositions(address,bytes32,bytes32,uint256[])")[..4]
        assert!(tx.data.starts_with("0x01b7037c"));
    }

    #[test]
    fn test_short_id_is_left_padded() {
        let tx = build_redeem_tx("0xabcd").unwrap();
        let full = build_redeem_tx(&format!("0x{}abcd", "0".repeat(60))).unwrap();
        assert_eq!(tx.data, full.data);
    }

    #[test]
    fn test_case_and_prefix_insensitive() {
        let a = parse_condition_id(COND).unwrap();
        let b = parse_condition_id(&COND.to_uppercase()).unwrap();
        let c = parse_condition_id(COND.strip_prefix("0x").unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_rejects_odd_length() {
        assert!(parse_condition_id("0xabc").is_err());
    }

    #[test]
    fn test_rejects_non_hex() {
        assert!(parse_condition_id("0xzzzz").is_err());
        assert!(build_redeem_tx("not a condition id").is_err());
    }

    #[test]
    fn test_rejects_over_length() {
        let too_long = format!("0x{}", "ab".repeat(33));
        assert!(parse_condition_id(&too_long).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(parse_condition_id("").is_err());
        assert!(parse_condition_id("0x").is_err());
    }

    #[test]
    fn test_data_bytes_round_trip() {
        let tx = build_redeem_tx(COND).unwrap();
        let bytes = tx.data_bytes().unwrap();
        assert_eq!(format!("0x{}", hex::encode(&bytes)), tx.data);
    }
}
