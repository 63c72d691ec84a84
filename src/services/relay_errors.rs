//! Relay error differentiation
//!
//! Parses relayer responses into structured errors so the orchestrator can
//! tell quota exhaustion (wait it out) and already-redeemed rejections
//! (benign) apart from real failures.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// How much error text is worth showing in a one-line report
const MAX_ERROR_LEN: usize = 300;

/// Structured relayer error types
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The relayer's submission quota is exhausted
    #[error("relayer rate-limited{}", reset_suffix(.reset_seconds))]
    RateLimited { reset_seconds: Option<u64> },
    /// The chain rejected a redemption that already went through earlier
    #[error("already redeemed on-chain")]
    AlreadyRedeemed,
    /// The relay refused the submission
    #[error("relay rejected the submission ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The chain reverted the batch after the relay accepted it
    #[error("transaction {state}{}", hash_suffix(.tx_hash))]
    ChainFailed {
        state: String,
        tx_hash: Option<String>,
    },
    /// Outcome unknown (poll gave out); resubmitting in the same cycle is
    /// unsafe because the redemption may have landed
    #[error("submission outcome unknown: {0}")]
    Ambiguous(String),
    /// Network/connection error (timeout, DNS, etc.)
    #[error("relay network error: {0}")]
    Network(String),
    /// Local signing failed before anything was submitted
    #[error("signing failed: {0}")]
    Signing(String),
}

fn hash_suffix(tx_hash: &Option<String>) -> String {
    match tx_hash {
        Some(h) => format!(" (tx: {})", h),
        None => String::new(),
    }
}

fn reset_suffix(reset_seconds: &Option<u64>) -> String {
    match reset_seconds {
        Some(secs) => format!(" (resets in {}s)", secs),
        None => String::new(),
    }
}

/// Relayer error response format
#[derive(Debug, Deserialize)]
struct RelayErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RelayError {
    /// Parse a relayer response into a structured error
    pub fn from_response(status: u16, body: &str) -> Self {
        let error_msg = if let Ok(parsed) = serde_json::from_str::<RelayErrorResponse>(body) {
            parsed.error.or(parsed.message).unwrap_or_default()
        } else {
            body.to_string()
        };
        let text = if error_msg.is_empty() { body } else { &error_msg };

        if status == 429 || is_rate_limit_text(text) {
            return RelayError::RateLimited {
                reset_seconds: parse_reset_seconds(text),
            };
        }

        let msg_lower = text.to_lowercase();
        if msg_lower.contains("already redeemed") || msg_lower.contains("nothing to redeem") {
            return RelayError::AlreadyRedeemed;
        }

        RelayError::Rejected {
            status,
            message: bounded(text),
        }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            RelayError::Network("Connection failed".to_string())
        } else {
            RelayError::Network(err.to_string())
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RelayError::RateLimited { .. })
    }

    pub fn reset_hint(&self) -> Option<u64> {
        match self {
            RelayError::RateLimited { reset_seconds } => *reset_seconds,
            _ => None,
        }
    }
}

/// Recognize the quota-exhaustion signatures that show up in relayer
/// bodies and in the claim helper's output
pub fn is_rate_limit_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("quota exceeded")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
        || text.contains("RATE_LIMIT_429")
        || Regex::new(r"\b429\b")
            .map(|re| re.is_match(text))
            .unwrap_or(false)
}

/// Extract a reset hint in seconds, from either the helper's machine-readable
/// marker line (`RATE_LIMIT_RESET_SECONDS: 3600`) or the relayer's prose
/// (`... resets in 3600 seconds`).
pub fn parse_reset_seconds(text: &str) -> Option<u64> {
    let marker = Regex::new(r"RATE_LIMIT_RESET_SECONDS:\s*(\d+)").ok()?;
    if let Some(caps) = marker.captures(text) {
        return caps[1].parse().ok();
    }

    let prose = Regex::new(r"(?i)resets in (\d+) seconds").ok()?;
    prose.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Truncate error text to a displayable length
pub fn bounded(text: &str) -> String {
    crate::types::truncate_chars(text.trim(), MAX_ERROR_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_rate_limited() {
        let err = RelayError::from_response(429, "");
        assert!(err.is_rate_limited());
        assert_eq!(err.reset_hint(), None);
    }

    #[test]
    fn test_quota_exceeded_with_reset_hint() {
        let err = RelayError::from_response(
            400,
            r#"{"error":"builder quota exceeded, resets in 1800 seconds"}"#,
        );
        assert!(err.is_rate_limited());
        assert_eq!(err.reset_hint(), Some(1800));
    }

    #[test]
    fn test_marker_line_reset_hint() {
        assert_eq!(
            parse_reset_seconds("RATE_LIMIT_429: quota\nRATE_LIMIT_RESET_SECONDS: 7200"),
            Some(7200)
        );
    }

    #[test]
    fn test_prose_reset_hint_case_insensitive() {
        assert_eq!(parse_reset_seconds("Quota Resets In 90 Seconds"), Some(90));
        assert_eq!(parse_reset_seconds("no hint here"), None);
    }

    #[test]
    fn test_bare_status_code_counts_only_as_a_word() {
        assert!(is_rate_limit_text("Request failed with status code 429"));
        assert!(!is_rate_limit_text("condition 0x429abc is fine"));
    }

    #[test]
    fn test_already_redeemed() {
        let err = RelayError::from_response(400, r#"{"message":"condition already redeemed"}"#);
        assert!(matches!(err, RelayError::AlreadyRedeemed));
    }

    #[test]
    fn test_generic_rejection_is_bounded() {
        let long = "x".repeat(1000);
        let err = RelayError::from_response(500, &long);
        match err {
            RelayError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert!(message.chars().count() <= 300);
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }
}
