//! Direct-custody submission: sign Safe transactions in-process and relay

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::redeem::build_redeem_tx;
use crate::services::relay::RelayClient;
use crate::services::relay_errors::{bounded, RelayError};
use crate::strategies::RedeemSubmitter;
use crate::types::ClaimOutcome;

pub struct SafeRelaySubmitter {
    relay: RelayClient,
    private_key: String,
}

impl SafeRelaySubmitter {
    pub fn new(config: &Config, api_key: &str, secret: &str, passphrase: &str) -> Self {
        Self {
            relay: RelayClient::new(&config.relayer_url, api_key, secret, passphrase),
            private_key: config.private_key.clone(),
        }
    }
}

#[async_trait]
impl RedeemSubmitter for SafeRelaySubmitter {
    async fn submit_batch(&self, condition_ids: &[String]) -> ClaimOutcome {
        // Build every payload before touching the network. One malformed id
        // fails the whole batch here, loudly, instead of burning a relay
        // submission on a partly wrong batch.
        let mut txs = Vec::with_capacity(condition_ids.len());
        for id in condition_ids {
            match build_redeem_tx(id) {
                Ok(tx) => txs.push(tx),
                Err(e) => {
                    return ClaimOutcome::Failed {
                        reason: bounded(&format!("condition id {:?}: {}", id, e)),
                    }
                }
            }
        }

        let signer: PrivateKeySigner = match self.private_key.parse() {
            Ok(s) => s,
            Err(e) => {
                return ClaimOutcome::Failed {
                    reason: format!("cannot parse signing key: {}", e),
                }
            }
        };

        let label = format!("Redeem {} positions", txs.len());
        match self.relay.submit_redemptions(&signer, &txs, &label).await {
            Ok(receipt) => {
                info!(
                    "Relay batch claimed {} market(s), tx={:?}",
                    receipt.markets, receipt.tx_hash
                );
                ClaimOutcome::Claimed {
                    markets: receipt.markets,
                    tx_hash: receipt.tx_hash,
                }
            }
            Err(e) => outcome_from_relay_error(e),
        }
    }

    fn describe(&self) -> &'static str {
        "Safe relay (direct custody)"
    }
}

fn outcome_from_relay_error(err: RelayError) -> ClaimOutcome {
    match err {
        RelayError::RateLimited { reset_seconds } => ClaimOutcome::RateLimited { reset_seconds },
        RelayError::AlreadyRedeemed => ClaimOutcome::AlreadyClaimed,
        RelayError::Rejected { ref message, .. } if looks_undeployed(message) => {
            // Polymarket-managed accounts have no Safe the relay can drive;
            // redemption has to happen from the web UI
            ClaimOutcome::Failed {
                reason: format!(
                    "account has no relay-drivable Safe ({}); claim from the Polymarket UI",
                    bounded(message)
                ),
            }
        }
        other => ClaimOutcome::Failed {
            reason: bounded(&other.to_string()),
        },
    }
}

fn looks_undeployed(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not deployed") || lower.contains("expected safe")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_through_with_hint() {
        let outcome = outcome_from_relay_error(RelayError::RateLimited {
            reset_seconds: Some(1800),
        });
        assert_eq!(
            outcome,
            ClaimOutcome::RateLimited {
                reset_seconds: Some(1800)
            }
        );
    }

    #[test]
    fn test_already_redeemed_is_benign() {
        let outcome = outcome_from_relay_error(RelayError::AlreadyRedeemed);
        assert_eq!(outcome, ClaimOutcome::AlreadyClaimed);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_undeployed_safe_gets_manual_claim_hint() {
        let outcome = outcome_from_relay_error(RelayError::Rejected {
            status: 400,
            message: "proxy wallet not deployed".to_string(),
        });
        match outcome {
            ClaimOutcome::Failed { reason } => assert!(reason.contains("Polymarket UI")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_errors_map_to_failed() {
        let outcome = outcome_from_relay_error(RelayError::Network("boom".to_string()));
        assert!(matches!(outcome, ClaimOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_malformed_id_fails_batch_before_any_submission() {
        let config = Config::for_tests();
        let submitter = SafeRelaySubmitter::new(&config, "k", "c2VjcmV0", "p");

        let outcome = submitter
            .submit_batch(&["not-hex-at-all".to_string()])
            .await;

        match outcome {
            ClaimOutcome::Failed { reason } => assert!(reason.contains("not-hex-at-all")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
