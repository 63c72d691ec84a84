//! Polymarket Claim Bot Library
//!
//! Automatically redeems resolved Polymarket positions. Winning shares in a
//! resolved market are worth 1.00 USDC each but sit as ERC-1155 tokens until
//! someone calls `redeemPositions` on the conditional tokens contract; the
//! bot watches for redeemable positions and claims them on a fixed schedule:
//!
//! 1. **Relayed redemption**: batch the resolved markets into gasless Safe
//!    transactions and submit them through Polymarket's relayer, either
//!    signed in-process (direct custody) or via an external signing helper
//!    (delegated custody).
//! 2. **CLOB sell fallback**: optionally dump winning shares at 0.99 on the
//!    order book when relayed redemption cannot land.

pub mod config;
pub mod orchestrator;
pub mod positions;
pub mod redeem;
pub mod services;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use orchestrator::Orchestrator;
pub use positions::{dedupe_condition_ids, DataApiClient, PositionSource};
pub use redeem::{build_redeem_tx, RedeemTx};
pub use strategies::{submitter_for, RedeemSubmitter};
pub use types::{ClaimOutcome, CustodyModel, CycleReport, RedeemablePosition, SellAttempt};
