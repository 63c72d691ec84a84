//! Polymarket Safe proxy wallet derivation
//!
//! Polymarket provisions each EOA a Gnosis Safe proxy at a deterministic
//! CREATE2 address; the relay expects that proxy as the `proxyWallet` of a
//! SAFE-type transaction.

use alloy::primitives::{keccak256, Address, B256};
use anyhow::{Context, Result};

/// Safe Proxy Factory address on Polygon
const SAFE_FACTORY: &str = "0xaacFeEa03eb1561C4e67d661e40682Bd20E3541b";
/// Init code hash for the Safe proxy
const SAFE_INIT_CODE_HASH: &str =
    "0x2bce2127ff07fb632d16c8347c4ebf501f4841168bed00d9e6ef715ddb6fcecf";

/// Derive the Polymarket Safe proxy address for an EOA.
/// CREATE2: address = keccak256(0xff ++ factory ++ salt ++ init_code_hash)[12..]
/// with salt = keccak256(eoa left-padded to 32 bytes).
pub fn derive_safe_wallet(eoa: Address) -> Result<Address> {
    let factory: Address = SAFE_FACTORY.parse().context("Invalid factory address")?;
    let init_code_hash: B256 = SAFE_INIT_CODE_HASH
        .parse()
        .context("Invalid init code hash")?;

    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(eoa.as_slice());
    let salt = keccak256(padded);

    let mut data = Vec::with_capacity(1 + 20 + 32 + 32);
    data.push(0xff);
    data.extend_from_slice(factory.as_slice());
    data.extend_from_slice(salt.as_slice());
    data.extend_from_slice(init_code_hash.as_slice());

    let hash = keccak256(&data);
    Ok(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let eoa: Address = "0x0000000000000000000000000000000000000001"
            .parse()
            .unwrap();
        let a = derive_safe_wallet(eoa).unwrap();
        let b = derive_safe_wallet(eoa).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, eoa);
    }

    #[test]
    fn test_distinct_eoas_get_distinct_proxies() {
        let a: Address = "0x0000000000000000000000000000000000000001"
            .parse()
            .unwrap();
        let b: Address = "0x0000000000000000000000000000000000000002"
            .parse()
            .unwrap();
        assert_ne!(
            derive_safe_wallet(a).unwrap(),
            derive_safe_wallet(b).unwrap()
        );
    }
}
