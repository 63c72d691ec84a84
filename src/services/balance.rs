//! USDC balance snapshot via Polygon JSON-RPC
//!
//! Display-only: the cycle report opens with the account's cash. This is
//! the one outbound call that honors the configured proxy.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::redeem::USDC_ADDRESS;

/// balanceOf(address) selector
const BALANCE_OF_SELECTOR: &str = "0x70a08231";
const USDC_DECIMALS: u32 = 6;

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: serde_json::Value,
    id: u32,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Client for balance queries against a Polygon RPC node
pub struct BalanceClient {
    client: reqwest::Client,
    rpc_url: String,
}

impl BalanceClient {
    pub fn new(config: &Config) -> Self {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30));

        if let Some(proxy_url) = &config.proxy_url {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!("Ignoring invalid proxy URL: {}", e),
            }
        }

        Self {
            client: builder.build().expect("Failed to create HTTP client"),
            rpc_url: config.polygon_rpc_url.clone(),
        }
    }

    /// Current USDC balance of the account
    pub async fn usdc_balance(&self, address: &str) -> Result<Decimal> {
        let padded = format!("{:0>64}", address.trim_start_matches("0x").to_lowercase());
        let data = format!("{}{}", BALANCE_OF_SELECTOR, padded);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: serde_json::json!([
                { "to": USDC_ADDRESS, "data": data },
                "latest"
            ]),
            id: 1,
        };

        debug!("Balance query for {} via {}", address, self.rpc_url);

        let response: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .context("Balance RPC call failed")?
            .json()
            .await
            .context("Failed to parse balance RPC response")?;

        if let Some(error) = response.error {
            anyhow::bail!("RPC error: {}", error);
        }
        let hex_balance = response.result.context("Balance RPC returned no result")?;

        let raw = parse_hex_u128(&hex_balance)?;
        usdc_from_raw(raw).with_context(|| format!("Balance result out of range: {}", hex_balance))
    }
}

/// Parse a 0x-prefixed hex word into an integer
fn parse_hex_u128(hex_str: &str) -> Result<u128> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(trimmed, 16)
        .with_context(|| format!("Malformed balance result: {}", hex_str))
}

/// Scale a raw token amount to USDC. Decimal's mantissa is 96 bits, so a
/// word outside that range is an error, not a panic; a node has no business
/// reporting such a balance anyway.
fn usdc_from_raw(raw: u128) -> Result<Decimal> {
    let signed = i128::try_from(raw).context("Balance word exceeds 96 bits")?;
    Decimal::try_from_i128_with_scale(signed, USDC_DECIMALS)
        .context("Balance word exceeds 96 bits")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_hex_u128() {
        assert_eq!(parse_hex_u128("0x1e8480").unwrap(), 2_000_000);
        assert_eq!(parse_hex_u128("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u128("0x").unwrap(), 0);
        assert!(parse_hex_u128("0xzz").is_err());
    }

    #[test]
    fn test_raw_to_usdc_scale() {
        let raw = parse_hex_u128("0x1e8480").unwrap();
        assert_eq!(usdc_from_raw(raw).unwrap(), dec!(2.000000));
    }

    #[test]
    fn test_oversized_word_errors_instead_of_panicking() {
        // 2^120 parses as a u128 but does not fit Decimal's 96-bit mantissa
        let raw = parse_hex_u128("0x1000000000000000000000000000000").unwrap();
        assert_eq!(raw, 1u128 << 120);
        assert!(usdc_from_raw(raw).is_err());
        // Past i128 as well
        assert!(usdc_from_raw(u128::MAX).is_err());
    }
}
