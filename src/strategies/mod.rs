//! Redemption submission strategies
//!
//! One capability, two custody paths: direct custody signs Safe
//! transactions in-process and relays them; delegated custody hands the
//! market ids to an external helper that owns the signer. The orchestrator
//! only ever talks to the trait.

pub mod clob_sell;
pub mod proxy_helper;
pub mod safe_relay;

pub use proxy_helper::ProxyHelperSubmitter;
pub use safe_relay::SafeRelaySubmitter;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::types::{ClaimOutcome, CustodyModel};

/// One batched redemption submission, whatever the custody model
#[async_trait]
pub trait RedeemSubmitter: Send + Sync {
    /// Claim every market in the batch. Never panics and never retries;
    /// every failure mode comes back as a [`ClaimOutcome`].
    async fn submit_batch(&self, condition_ids: &[String]) -> ClaimOutcome;

    /// Get path name for display
    fn describe(&self) -> &'static str;
}

/// Pick the submission path for this configuration. `None` when relayed
/// claims are switched off or the builder credential triple is incomplete;
/// in that case submission must not be attempted at all and the report
/// advises claiming manually.
pub fn submitter_for(config: &Config) -> Option<Box<dyn RedeemSubmitter>> {
    if !config.use_relayer {
        return None;
    }

    let Some((api_key, secret, passphrase)) = config.builder_credentials() else {
        warn!("Builder credentials incomplete; relayed claims disabled");
        return None;
    };

    match config.custody {
        CustodyModel::Delegated => Some(Box::new(ProxyHelperSubmitter::new(config))),
        CustodyModel::Direct => Some(Box::new(SafeRelaySubmitter::new(
            config, api_key, secret, passphrase,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_submitter_when_relayer_disabled() {
        let mut config = Config::for_tests();
        config.use_relayer = false;
        assert!(submitter_for(&config).is_none());
    }

    #[test]
    fn test_no_submitter_without_full_credential_triple() {
        let mut config = Config::for_tests();
        config.builder_secret = None;
        assert!(submitter_for(&config).is_none());
    }

    #[test]
    fn test_custody_selects_the_path() {
        let mut config = Config::for_tests();

        config.custody = CustodyModel::Direct;
        let direct = submitter_for(&config).unwrap();
        assert!(direct.describe().contains("relay"));

        config.custody = CustodyModel::Delegated;
        let delegated = submitter_for(&config).unwrap();
        assert!(delegated.describe().contains("helper"));
    }
}
