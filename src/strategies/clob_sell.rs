//! CLOB sell fallback for claims the relay cannot land
//!
//! A resolved winning share is worth 1.00 USDC on redemption. When relayed
//! redemption is unavailable, dumping the share at 0.99 on the order book
//! converts it to cash immediately for a one-cent haircut. Resolved books
//! always have a 1.00-side buyer, so a 0.99 GTC sell fills at once.

use alloy::primitives::U256;
use alloy::signers::{local::PrivateKeySigner, Signer};
use anyhow::{Context, Result};
use polymarket_client_sdk::auth::{state::Authenticated, Normal};
use polymarket_client_sdk::clob::types::{
    OrderType as ClobOrderType, Side as ClobSide, SignatureType,
};
use polymarket_client_sdk::clob::{Client as ClobClient, Config as ClobConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::config::Config;
use crate::redeem::CHAIN_ID;
use crate::types::{RedeemablePosition, SellAttempt};

const CLOB_ENDPOINT: &str = "https://clob.polymarket.com";
const SELL_PRICE: Decimal = dec!(0.99);
/// CLOB rejects dust orders outright; skip anything below this
const MIN_SELL_SIZE: Decimal = dec!(0.01);

/// Orders can only be built and posted through an authenticated client
type AuthedClob = ClobClient<Authenticated<Normal>>;

/// Sell each position at 0.99, one order per share token. Every attempt is
/// reported individually; one rejected order never blocks the rest.
pub async fn liquidate(config: &Config, positions: &[RedeemablePosition]) -> Vec<SellAttempt> {
    let mut attempts = Vec::with_capacity(positions.len());
    let mut sellable = Vec::new();

    for position in positions {
        match precheck(position) {
            Ok(()) => sellable.push(position),
            Err(reason) => {
                warn!("Skipping sell for {}: {}", position.label(), reason);
                attempts.push(SellAttempt {
                    title: position.short_label(60),
                    ok: false,
                    order_id: None,
                    error: Some(reason),
                });
            }
        }
    }

    if sellable.is_empty() {
        return attempts;
    }

    let (client, signer) = match connect(&config.private_key).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("CLOB connect failed, no sells placed: {:#}", e);
            for position in sellable {
                attempts.push(SellAttempt {
                    title: position.short_label(60),
                    ok: false,
                    order_id: None,
                    error: Some(format!("CLOB auth failed: {}", e)),
                });
            }
            return attempts;
        }
    };

    for position in sellable {
        let attempt = match place_sell(&client, &signer, position).await {
            Ok(order_id) => {
                info!("Sell placed for {}: id={}", position.label(), order_id);
                SellAttempt {
                    title: position.short_label(60),
                    ok: true,
                    order_id: Some(order_id),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Sell failed for {}: {:#}", position.label(), e);
                SellAttempt {
                    title: position.short_label(60),
                    ok: false,
                    order_id: None,
                    error: Some(format!("{:#}", e)),
                }
            }
        };
        attempts.push(attempt);
    }

    attempts
}

async fn connect(private_key: &str) -> Result<(AuthedClob, PrivateKeySigner)> {
    let signer: PrivateKeySigner = private_key
        .parse()
        .context("Failed to parse private key")?;
    let signer = signer.with_chain_id(Some(CHAIN_ID));

    let clob_config = ClobConfig::builder().use_server_time(true).build();

    // GnosisSafe signature type: shares sit in the Safe proxy, not the EOA,
    // and the CLOB checks the funder's balance at order time
    let client = ClobClient::new(CLOB_ENDPOINT, clob_config)
        .context("Failed to create CLOB client")?
        .authentication_builder(&signer)
        .signature_type(SignatureType::GnosisSafe)
        .authenticate()
        .await
        .context("Failed to authenticate with CLOB")?;

    Ok((client, signer))
}

async fn place_sell(
    client: &AuthedClob,
    signer: &PrivateKeySigner,
    position: &RedeemablePosition,
) -> Result<String> {
    // precheck() already guaranteed the token id is present
    let token_id = position.share_token().context("Position missing token id")?;
    let token_id_u256 = U256::from_str_radix(token_id, 10).context("Failed to parse token ID")?;
    let shares = position.quantity();

    info!(
        "Placing GTC limit SELL: token={}, price={}, shares={}",
        token_id, SELL_PRICE, shares
    );

    let order = client
        .limit_order()
        .token_id(token_id_u256)
        .size(shares)
        .side(ClobSide::Sell)
        .price(SELL_PRICE.trunc_with_scale(2))
        .order_type(ClobOrderType::GTC)
        .build()
        .await
        .context("Failed to build sell order")?;

    let signed_order = client.sign(signer, order).await.context("Failed to sign order")?;
    let response = client
        .post_order(signed_order)
        .await
        .context("Failed to submit sell order")?;

    Ok(response.order_id)
}

/// Check a position has everything an order needs before any network call
fn precheck(position: &RedeemablePosition) -> Result<(), String> {
    if position.share_token().is_none() {
        return Err("missing share token id".to_string());
    }
    if position.quantity() < MIN_SELL_SIZE {
        return Err(format!(
            "missing size (have {}, CLOB minimum {})",
            position.quantity(),
            MIN_SELL_SIZE
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(asset: Option<&str>, size: Option<Decimal>) -> RedeemablePosition {
        RedeemablePosition {
            condition_id: "0xabc".to_string(),
            title: Some("Will it resolve?".to_string()),
            slug: None,
            asset: asset.map(str::to_string),
            size,
            current_value: None,
            outcome: Some("Yes".to_string()),
        }
    }

    #[test]
    fn test_precheck_accepts_sellable_position() {
        let p = position(Some("123456"), Some(dec!(10.5)));
        assert!(precheck(&p).is_ok());
    }

    #[test]
    fn test_precheck_rejects_missing_token() {
        let p = position(None, Some(dec!(10)));
        let err = precheck(&p).unwrap_err();
        assert!(err.contains("token id"));
    }

    #[test]
    fn test_precheck_rejects_dust() {
        let p = position(Some("123456"), Some(dec!(0.005)));
        let err = precheck(&p).unwrap_err();
        assert!(err.contains("missing size"));
    }

    #[test]
    fn test_precheck_rejects_zero_size() {
        let p = position(Some("123456"), None);
        assert!(precheck(&p).is_err());
    }

    #[tokio::test]
    async fn test_unsellable_positions_reported_without_network() {
        let config = Config::for_tests();
        let attempts = liquidate(&config, &[position(None, Some(dec!(5)))]).await;

        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].ok);
        assert!(attempts[0].error.as_deref().unwrap_or("").contains("token id"));
    }
}
