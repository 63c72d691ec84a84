//! Core types for the Polymarket claim bot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position the Data API reports as redeemable (market resolved, user won).
///
/// The API has shipped both camelCase and snake_case keys for some fields,
/// and older payloads used `tokenId` where newer ones use `asset`. All of
/// that is resolved here, at the boundary, so the rest of the bot only ever
/// sees the accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemablePosition {
    #[serde(default, alias = "condition_id")]
    pub condition_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    /// ERC-1155 share token id
    #[serde(default, alias = "tokenId")]
    pub asset: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub current_value: Option<Decimal>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl RedeemablePosition {
    /// Human label: title, else slug, else a placeholder
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.slug.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("unknown")
    }

    /// Share quantity: `size`, else `currentValue`, else zero. A zero counts
    /// as absent so a stale zero size falls through.
    pub fn quantity(&self) -> Decimal {
        self.size
            .filter(|v| !v.is_zero())
            .or(self.current_value.filter(|v| !v.is_zero()))
            .unwrap_or(Decimal::ZERO)
    }

    /// Share token id, if the record carries one
    pub fn share_token(&self) -> Option<&str> {
        self.asset.as_deref().filter(|s| !s.is_empty())
    }

    /// Get a shortened label for display (handles UTF-8 properly)
    pub fn short_label(&self, max_len: usize) -> String {
        truncate_chars(self.label(), max_len)
    }
}

/// Truncate to `max_len` characters with an ellipsis, never splitting a
/// multi-byte character.
pub fn truncate_chars(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let truncated: String = chars[..max_len.saturating_sub(3)].iter().collect();
        format!("{}...", truncated)
    }
}

/// How the account's funds are held, which decides the claim path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyModel {
    /// The configured key controls the Safe directly; sign and relay in-process
    Direct,
    /// Claims must go through the external signer helper
    Delegated,
}

impl CustodyModel {
    pub fn from_signature_type(sig_type: u8) -> Self {
        if sig_type == 1 {
            CustodyModel::Delegated
        } else {
            CustodyModel::Direct
        }
    }
}

impl fmt::Display for CustodyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustodyModel::Direct => write!(f, "direct"),
            CustodyModel::Delegated => write!(f, "delegated"),
        }
    }
}

/// Result of one batched redemption submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    /// The relay accepted and mined the batch
    Claimed {
        markets: usize,
        tx_hash: Option<String>,
    },
    /// The chain rejected a re-submission of an already-redeemed batch.
    /// Harmless: the funds were recovered by an earlier cycle.
    AlreadyClaimed,
    /// The relayer's quota is exhausted
    RateLimited { reset_seconds: Option<u64> },
    Failed { reason: String },
}

impl ClaimOutcome {
    /// Funds are (or already were) recovered
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ClaimOutcome::Claimed { .. } | ClaimOutcome::AlreadyClaimed
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClaimOutcome::RateLimited { .. })
    }

    pub fn claimed_markets(&self) -> usize {
        match self {
            ClaimOutcome::Claimed { markets, .. } => *markets,
            _ => 0,
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimOutcome::Claimed { markets, tx_hash } => {
                write!(f, "claimed {} market(s)", markets)?;
                if let Some(hash) = tx_hash {
                    write!(f, " (tx: {})", hash)?;
                }
                Ok(())
            }
            ClaimOutcome::AlreadyClaimed => write!(f, "already redeemed on-chain"),
            ClaimOutcome::RateLimited { reset_seconds } => {
                write!(f, "relayer rate-limited")?;
                if let Some(secs) = reset_seconds {
                    write!(f, " (resets in ~{})", format_duration_secs(*secs))?;
                }
                Ok(())
            }
            ClaimOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Format a second count as "Xh Ym" / "Ym" / "Zs" for report lines
pub fn format_duration_secs(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// One fallback sell attempt, success or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellAttempt {
    pub title: String,
    pub ok: bool,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

/// Everything one cycle learned and did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// USDC balance snapshot; None when the RPC lookup was skipped
    pub balance: Option<Decimal>,
    /// The cycle's positions as fetched, for the report listing
    pub positions: Vec<RedeemablePosition>,
    pub markets: usize,
    /// None when no submitter was configured or there was no work
    pub relay: Option<ClaimOutcome>,
    pub sells: Vec<SellAttempt>,
}

impl CycleReport {
    pub fn rate_limited(&self) -> bool {
        self.relay
            .as_ref()
            .map(|o| o.is_rate_limited())
            .unwrap_or(false)
    }

    pub fn relay_succeeded(&self) -> bool {
        self.relay.as_ref().map(|o| o.is_success()).unwrap_or(false)
    }

    pub fn sells_succeeded(&self) -> usize {
        self.sells.iter().filter(|s| s.ok).count()
    }

    /// Work was found but nothing recovered it this cycle
    pub fn needs_manual_claim(&self) -> bool {
        self.markets > 0 && !self.relay_succeeded() && self.sells_succeeded() == 0
    }
}
