//! Gasless redemption via the Polymarket relayer
//!
//! The relayer executes Safe transactions on the account's behalf and
//! sponsors gas. There is no dedicated /redeem endpoint: each redemption is
//! ABI-encoded calldata wrapped in an EIP-712-signed Safe transaction, and a
//! whole cycle's markets go up as one batch: fetch the Safe's next nonce,
//! sign payload i at nonce+i, POST the signed array to /submit under
//! builder HMAC auth, then poll /transaction until mined or failed.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::signers::{local::PrivateKeySigner, Signer};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::redeem::{RedeemTx, CHAIN_ID};
use crate::services::relay_errors::RelayError;
use crate::services::safe_proxy::derive_safe_wallet;

type HmacSha256 = Hmac<Sha256>;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const POLL_ATTEMPTS: u32 = 30;
const POLL_INTERVAL_SECS: u64 = 2;

/// Aggregate result of one relay submission
#[derive(Debug, Clone)]
pub struct RelayReceipt {
    pub markets: usize,
    pub tx_hash: Option<String>,
}

/// Client for the Polymarket relayer's builder API
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret: String,
    passphrase: String,
}

impl RelayClient {
    pub fn new(base_url: &str, api_key: &str, secret: &str, passphrase: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(90))
                .no_proxy()
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            passphrase: passphrase.to_string(),
        }
    }

    /// Submit a batch of redemption payloads as signed Safe transactions
    /// and wait for the aggregate outcome.
    pub async fn submit_redemptions(
        &self,
        signer: &PrivateKeySigner,
        txs: &[RedeemTx],
        label: &str,
    ) -> Result<RelayReceipt, RelayError> {
        if txs.is_empty() {
            return Ok(RelayReceipt {
                markets: 0,
                tx_hash: None,
            });
        }

        let eoa = signer.address();
        let safe = derive_safe_wallet(eoa).map_err(|e| RelayError::Signing(e.to_string()))?;

        info!(
            "Relay: EOA={:?} Safe={:?} batch={} label={:?}",
            eoa,
            safe,
            txs.len(),
            label
        );

        // One nonce fetch covers the batch; payload i signs at nonce + i
        let nonce = self.get_nonce(eoa).await?;
        debug!("Relay nonce: {}", nonce);

        let mut signed = Vec::with_capacity(txs.len());
        for (i, tx) in txs.iter().enumerate() {
            signed.push(self.sign_payload(signer, safe, tx, nonce + i as u64).await?);
        }

        let body_json = serde_json::json!({
            "transactions": signed,
            "description": label,
        });
        let body = serde_json::to_string(&body_json)
            .map_err(|e| RelayError::Signing(e.to_string()))?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let sig_payload = format!("{}POST/submit{}", timestamp, body);
        let hmac_sig = self.compute_hmac(&sig_payload)?;

        let response = self
            .client
            .post(format!("{}/submit", self.base_url))
            .header("Content-Type", "application/json")
            .header("POLY_BUILDER_TIMESTAMP", &timestamp)
            .header("POLY_BUILDER_SIGNATURE", &hmac_sig)
            .header("POLY_BUILDER_API_KEY", &self.api_key)
            .header("POLY_BUILDER_PASSPHRASE", &self.passphrase)
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::from_network_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_body = response.text().await.unwrap_or_default();
            warn!("Relay submit failed: {} - {}", status, error_body);
            return Err(RelayError::from_response(status, &error_body));
        }

        let submit_resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Network(format!("Bad submit response: {}", e)))?;

        let tx_id = submit_resp
            .get("transactionID")
            .or_else(|| submit_resp.get("transactionId"))
            .or_else(|| submit_resp.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if tx_id.is_empty() {
            return Err(RelayError::Ambiguous(
                "No transaction ID returned by the relay".to_string(),
            ));
        }
        info!("Relay submitted: tx_id={}, base_nonce={}", tx_id, nonce);

        let tx_hash = self.poll_transaction(&tx_id).await?;
        Ok(RelayReceipt {
            markets: txs.len(),
            tx_hash,
        })
    }

    /// EIP-712-sign one payload at the given Safe nonce, in the shape the
    /// relay's /submit endpoint takes
    async fn sign_payload(
        &self,
        signer: &PrivateKeySigner,
        safe: Address,
        tx: &RedeemTx,
        nonce: u64,
    ) -> Result<serde_json::Value, RelayError> {
        let to: Address = tx
            .to
            .parse()
            .map_err(|e| RelayError::Signing(format!("Bad target address: {}", e)))?;
        let calldata = tx
            .data_bytes()
            .map_err(|e| RelayError::Signing(e.to_string()))?;

        let tx_hash = compute_safe_tx_hash(safe, to, &calldata, nonce);

        // Safe flags eth_sign-style signatures with v > 30
        let signature = signer
            .sign_message(tx_hash.as_slice())
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        let v: u8 = if signature.v() { 32 } else { 31 };

        let mut packed = Vec::with_capacity(65);
        packed.extend_from_slice(&signature.r().to_be_bytes::<32>());
        packed.extend_from_slice(&signature.s().to_be_bytes::<32>());
        packed.push(v);

        Ok(serde_json::json!({
            "type": "SAFE",
            "from": format!("{:?}", signer.address()),
            "to": format!("{:?}", to),
            "proxyWallet": format!("{:?}", safe),
            "data": tx.data.clone(),
            "signature": format!("0x{}", hex::encode(&packed)),
            "value": tx.value.clone(),
            "nonce": nonce.to_string(),
            "signatureParams": {
                "gasPrice": "0",
                "operation": "0",
                "safeTxnGas": "0",
                "baseGas": "0",
                "gasToken": ZERO_ADDRESS,
                "refundReceiver": ZERO_ADDRESS
            },
        }))
    }

    /// Next Safe nonce for the account
    async fn get_nonce(&self, eoa: Address) -> Result<u64, RelayError> {
        let path = format!("/nonce?address={:?}&type=SAFE", eoa);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let sig_payload = format!("{}GET{}", timestamp, path);
        let hmac_sig = self.compute_hmac(&sig_payload)?;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("POLY_BUILDER_TIMESTAMP", &timestamp)
            .header("POLY_BUILDER_SIGNATURE", &hmac_sig)
            .header("POLY_BUILDER_API_KEY", &self.api_key)
            .header("POLY_BUILDER_PASSPHRASE", &self.passphrase)
            .send()
            .await
            .map_err(|e| RelayError::from_network_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::from_response(status, &body));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Network(format!("Bad nonce response: {}", e)))?;

        // The relay has returned the nonce both as a number and as a string
        match resp.get("nonce") {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| RelayError::Rejected {
                    status: 200,
                    message: format!("Unexpected nonce value: {}", n),
                }),
            Some(serde_json::Value::String(s)) => s.parse().map_err(|_| RelayError::Rejected {
                status: 200,
                message: format!("Unexpected nonce value: {:?}", s),
            }),
            other => Err(RelayError::Rejected {
                status: 200,
                message: format!("Unexpected nonce format: {:?}", other),
            }),
        }
    }

    /// Poll until the relay reports the batch mined or failed. A poll
    /// timeout leaves the on-chain state unknown; the caller must not
    /// resubmit within the same cycle.
    async fn poll_transaction(&self, tx_id: &str) -> Result<Option<String>, RelayError> {
        info!("Relay: polling for tx_id={}", tx_id);

        for i in 0..POLL_ATTEMPTS {
            tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let path = format!("/transaction?id={}", tx_id);
            let timestamp = chrono::Utc::now().timestamp().to_string();
            let sig_payload = format!("{}GET{}", timestamp, path);
            let hmac_sig = match self.compute_hmac(&sig_payload) {
                Ok(h) => h,
                Err(_) => continue,
            };

            let response = self
                .client
                .get(format!("{}{}", self.base_url, path))
                .header("POLY_BUILDER_TIMESTAMP", &timestamp)
                .header("POLY_BUILDER_SIGNATURE", &hmac_sig)
                .header("POLY_BUILDER_API_KEY", &self.api_key)
                .header("POLY_BUILDER_PASSPHRASE", &self.passphrase)
                .send()
                .await;

            let Ok(resp) = response else { continue };
            let Ok(txns) = resp.json::<Vec<serde_json::Value>>().await else {
                continue;
            };
            let Some(txn) = txns.first() else { continue };

            let state = txn.get("state").and_then(|s| s.as_str()).unwrap_or("");
            let tx_hash = txn
                .get("transactionHash")
                .and_then(|h| h.as_str())
                .map(|s| s.to_string());

            match state {
                "STATE_MINED" | "STATE_CONFIRMED" => {
                    info!("Relay batch confirmed: tx={:?}", tx_hash);
                    return Ok(tx_hash);
                }
                "STATE_FAILED" | "STATE_INVALID" => {
                    warn!("Relay batch {}: hash={:?}", state, tx_hash);
                    return Err(RelayError::ChainFailed {
                        state: state.to_string(),
                        tx_hash,
                    });
                }
                _ => {
                    if i % 5 == 0 {
                        debug!(
                            "Relay polling: state={}, attempt {}/{}",
                            state,
                            i + 1,
                            POLL_ATTEMPTS
                        );
                    }
                }
            }
        }

        warn!("Relay polling timed out for tx_id={}", tx_id);
        Err(RelayError::Ambiguous(format!(
            "Polling timed out after {}s; on-chain state unknown",
            POLL_ATTEMPTS as u64 * POLL_INTERVAL_SECS
        )))
    }

    /// HMAC-SHA256 signature for builder auth
    fn compute_hmac(&self, payload: &str) -> Result<String, RelayError> {
        compute_hmac(&self.secret, payload)
    }
}

/// Builder secrets have shipped in three base64 flavors; try them in order
fn compute_hmac(secret: &str, payload: &str) -> Result<String, RelayError> {
    let secret_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(secret)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(secret))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))
        .map_err(|e| RelayError::Signing(format!("Failed to decode builder secret: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| RelayError::Signing(format!("Invalid HMAC key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Compute the EIP-712 Safe transaction hash the owner key signs
fn compute_safe_tx_hash(safe_address: Address, to: Address, data: &[u8], nonce: u64) -> B256 {
    // Domain separator: keccak256(abi.encode(typehash, chainId, verifyingContract))
    let domain_typehash = keccak256(b"EIP712Domain(uint256 chainId,address verifyingContract)");
    let mut domain_data = Vec::with_capacity(96);
    domain_data.extend_from_slice(domain_typehash.as_slice());
    domain_data.extend_from_slice(&U256::from(CHAIN_ID).to_be_bytes::<32>());
    domain_data.extend_from_slice(&left_pad_address(safe_address));
    let domain_separator = keccak256(&domain_data);

    let safe_tx_typehash = keccak256(
        b"SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)",
    );

    // abi.encode(typehash, to, value, keccak256(data), operation, safeTxGas,
    // baseGas, gasPrice, gasToken, refundReceiver, nonce). EIP-712 encodes
    // dynamic bytes as their hash; all gas fields and operation are zero
    let mut struct_data = Vec::with_capacity(352);
    struct_data.extend_from_slice(safe_tx_typehash.as_slice());
    struct_data.extend_from_slice(&left_pad_address(to));
    struct_data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // value
    struct_data.extend_from_slice(keccak256(data).as_slice());
    struct_data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // operation
    struct_data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // safeTxGas
    struct_data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // baseGas
    struct_data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // gasPrice
    struct_data.extend_from_slice(&[0u8; 32]); // gasToken
    struct_data.extend_from_slice(&[0u8; 32]); // refundReceiver
    struct_data.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
    let struct_hash = keccak256(&struct_data);

    let mut final_data = Vec::with_capacity(66);
    final_data.push(0x19);
    final_data.push(0x01);
    final_data.extend_from_slice(domain_separator.as_slice());
    final_data.extend_from_slice(struct_hash.as_slice());

    keccak256(&final_data)
}

fn left_pad_address(addr: Address) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[12..].copy_from_slice(addr.as_slice());
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from_slice(&bytes)
    }

    #[test]
    fn test_safe_tx_hash_is_deterministic() {
        let a = compute_safe_tx_hash(addr(1), addr(2), &[0xab, 0xcd], 7);
        let b = compute_safe_tx_hash(addr(1), addr(2), &[0xab, 0xcd], 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_safe_tx_hash_depends_on_nonce_and_data() {
        let base = compute_safe_tx_hash(addr(1), addr(2), &[0xab], 7);
        assert_ne!(base, compute_safe_tx_hash(addr(1), addr(2), &[0xab], 8));
        assert_ne!(base, compute_safe_tx_hash(addr(1), addr(2), &[0xac], 7));
        assert_ne!(base, compute_safe_tx_hash(addr(3), addr(2), &[0xab], 7));
    }

    #[test]
    fn test_hmac_is_deterministic_per_payload() {
        let a = compute_hmac("c2VjcmV0", "1700000000POST/submit{}").unwrap();
        let b = compute_hmac("c2VjcmV0", "1700000000POST/submit{}").unwrap();
        let c = compute_hmac("c2VjcmV0", "1700000001POST/submit{}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hmac_accepts_standard_alphabet_secret() {
        // '+' and '/' only decode with the standard alphabet fallback
        assert!(compute_hmac("+/+/abcd", "payload").is_ok());
    }

    #[test]
    fn test_hmac_rejects_garbage_secret() {
        assert!(compute_hmac("not base64 !!!", "payload").is_err());
    }
}
