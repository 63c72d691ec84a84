//! Delegated-custody submission through the external signer helper
//!
//! Polymarket-managed accounts keep the proxy keys on Polymarket's side, so
//! redemption has to run through their signing flow. That flow lives in a
//! small Node script; this module shells out to it with the condition ids
//! and reads the verdict back from the exit code and output.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::services::relay_errors::{bounded, is_rate_limit_text, parse_reset_seconds};
use crate::strategies::RedeemSubmitter;
use crate::types::ClaimOutcome;

/// Proxy env vars stripped from the helper's environment. The helper talks to
/// Polymarket's signing endpoint directly; a datacenter egress proxy on that
/// path gets the request flagged.
const PROXY_ENV_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

const HELPER_TIMEOUT_SECS: u64 = 120;

pub struct ProxyHelperSubmitter {
    bin: String,
    script: String,
    timeout: Duration,
}

impl ProxyHelperSubmitter {
    pub fn new(config: &Config) -> Self {
        Self {
            bin: config.helper_bin.clone(),
            script: config.helper_script.clone(),
            timeout: Duration::from_secs(HELPER_TIMEOUT_SECS),
        }
    }
}

#[async_trait]
impl RedeemSubmitter for ProxyHelperSubmitter {
    async fn submit_batch(&self, condition_ids: &[String]) -> ClaimOutcome {
        info!(
            "Running claim helper for {} market(s): {} {}",
            condition_ids.len(),
            self.bin,
            self.script
        );

        let mut cmd = Command::new(&self.bin);
        cmd.arg(&self.script).args(condition_ids);
        for var in PROXY_ENV_VARS {
            cmd.env_remove(var);
        }
        // A helper that outlives the timeout would keep the signing session
        // alive and could still submit; kill it when the wait is abandoned
        cmd.kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output());
        let output = match run.await {
            Err(_) => {
                return ClaimOutcome::Failed {
                    reason: format!(
                        "helper timed out after {}s; on-chain state unknown",
                        self.timeout.as_secs()
                    ),
                }
            }
            Ok(Err(e)) => {
                return ClaimOutcome::Failed {
                    reason: format!("failed to launch helper ({} {}): {}", self.bin, self.script, e),
                }
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("Helper exit: {:?}", output.status.code());

        interpret_helper_result(output.status.code(), &stdout, &stderr, condition_ids.len())
    }

    fn describe(&self) -> &'static str {
        "external claim helper (delegated custody)"
    }
}

/// Map the helper's exit code and output onto a claim outcome. Exit 0 means
/// every market went through; anything else is inspected for the relay's
/// rate-limit wording before being reported as a failure.
fn interpret_helper_result(
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
    markets: usize,
) -> ClaimOutcome {
    if exit_code == Some(0) {
        return ClaimOutcome::Claimed {
            markets,
            tx_hash: scan_tx_hash(stdout),
        };
    }

    let combined = format!("{}\n{}", stdout, stderr);
    if is_rate_limit_text(&combined) {
        return ClaimOutcome::RateLimited {
            reset_seconds: parse_reset_seconds(&combined),
        };
    }

    let code = match exit_code {
        Some(c) => c.to_string(),
        None => "killed by signal".to_string(),
    };
    ClaimOutcome::Failed {
        reason: format!("helper exited with {}: {}", code, bounded(combined.trim())),
    }
}

/// Pull the transaction hash out of the helper's success output, if it
/// printed one (`tx: 0x...`).
fn scan_tx_hash(stdout: &str) -> Option<String> {
    let re = Regex::new(r"tx:\s*(0x[0-9a-fA-F]+)").ok()?;
    re.captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter(bin: &str, script: &str) -> ProxyHelperSubmitter {
        ProxyHelperSubmitter {
            bin: bin.to_string(),
            script: script.to_string(),
            timeout: Duration::from_secs(HELPER_TIMEOUT_SECS),
        }
    }

    #[test]
    fn test_exit_zero_claims_all_markets() {
        let outcome = interpret_helper_result(Some(0), "claimed 3 markets\ntx: 0xabc123\n", "", 3);
        assert_eq!(
            outcome,
            ClaimOutcome::Claimed {
                markets: 3,
                tx_hash: Some("0xabc123".to_string()),
            }
        );
    }

    #[test]
    fn test_exit_zero_without_hash_still_succeeds() {
        let outcome = interpret_helper_result(Some(0), "done\n", "", 1);
        assert_eq!(
            outcome,
            ClaimOutcome::Claimed {
                markets: 1,
                tx_hash: None,
            }
        );
    }

    #[test]
    fn test_rate_limit_marker_in_stderr() {
        let outcome = interpret_helper_result(
            Some(1),
            "",
            "RATE_LIMIT_429\nRATE_LIMIT_RESET_SECONDS: 1800\n",
            2,
        );
        assert_eq!(
            outcome,
            ClaimOutcome::RateLimited {
                reset_seconds: Some(1800),
            }
        );
    }

    #[test]
    fn test_rate_limit_prose_without_marker() {
        let outcome =
            interpret_helper_result(Some(1), "relayer said: too many requests\n", "", 1);
        assert!(outcome.is_rate_limited());
    }

    #[test]
    fn test_nonzero_exit_reports_output() {
        let outcome = interpret_helper_result(Some(2), "", "signer rejected the payload\n", 1);
        match outcome {
            ClaimOutcome::Failed { reason } => {
                assert!(reason.contains("exited with 2"));
                assert!(reason.contains("signer rejected"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_killed_helper_reports_signal() {
        let outcome = interpret_helper_result(None, "", "", 1);
        match outcome {
            ClaimOutcome::Failed { reason } => assert!(reason.contains("killed by signal")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_tx_hash_variants() {
        assert_eq!(
            scan_tx_hash("submitted\ntx: 0xDEADbeef01"),
            Some("0xDEADbeef01".to_string())
        );
        assert_eq!(scan_tx_hash("tx:0xaa"), Some("0xaa".to_string()));
        assert_eq!(scan_tx_hash("no hash here"), None);
    }

    #[tokio::test]
    async fn test_spawn_success_path() {
        let outcome = submitter("true", "ignored")
            .submit_batch(&["0xabc".to_string()])
            .await;
        assert!(matches!(outcome, ClaimOutcome::Claimed { markets: 1, .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_path() {
        let outcome = submitter("false", "ignored")
            .submit_batch(&["0xabc".to_string()])
            .await;
        assert!(matches!(outcome, ClaimOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_helper_env_scrubbed_of_proxy_vars() {
        // The child sees the parent's environment minus the proxy vars, so
        // `test -z` on one of them must pass even when the parent sets it
        std::env::set_var("HTTP_PROXY", "http://127.0.0.1:9999");
        let outcome = submitter("sh", "-c")
            .submit_batch(&["test -z \"$HTTP_PROXY\"".to_string()])
            .await;
        std::env::remove_var("HTTP_PROXY");
        assert!(matches!(outcome, ClaimOutcome::Claimed { .. }));
    }

    #[tokio::test]
    async fn test_timed_out_helper_child_is_killed() {
        let marker = std::env::temp_dir().join(format!(
            "claimbot-helper-kill-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        let _ = std::fs::remove_file(&marker);

        let mut slow = submitter("sh", "-c");
        slow.timeout = Duration::from_millis(200);
        let outcome = slow
            .submit_batch(&[format!("sleep 2 && touch {}", marker.display())])
            .await;

        match outcome {
            ClaimOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected Failed, got {:?}", other),
        }

        // A surviving child would reach the touch after its sleep; a killed
        // one never does
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "helper child survived the timeout");
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_launch_error() {
        let outcome = submitter("/nonexistent/claimbot-helper", "x")
            .submit_batch(&["0xabc".to_string()])
            .await;
        match outcome {
            ClaimOutcome::Failed { reason } => assert!(reason.contains("failed to launch")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
