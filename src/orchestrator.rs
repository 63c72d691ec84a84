//! Cycle orchestrator: fetch, claim, report, sleep, repeat
//!
//! One cycle runs fully before the next starts. `run_cycle` is a single
//! pass; `run` is the supervising loop that keeps the process alive no
//! matter what a cycle does. Nothing below this module terminates the
//! process.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use tracing::{error, info};

use crate::config::Config;
use crate::positions::{dedupe_condition_ids, DataApiClient, PositionSource};
use crate::services::balance::BalanceClient;
use crate::strategies::{self, clob_sell, RedeemSubmitter};
use crate::types::{format_duration_secs, truncate_chars, CycleReport, RedeemablePosition};

/// How many positions the cycle report lists before eliding the rest
const REPORT_LIST_CAP: usize = 15;

pub struct Orchestrator {
    config: Config,
    source: Box<dyn PositionSource>,
    submitter: Option<Box<dyn RedeemSubmitter>>,
    /// None skips the lookup and leaves the report's balance empty
    balance: Option<BalanceClient>,
    /// Sticky across cycles: set by a quota-exhausted submission, cleared
    /// by the next successful one
    rate_limit_active: bool,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let source = Box::new(DataApiClient::new(&config));
        let submitter = strategies::submitter_for(&config);
        let balance = Some(BalanceClient::new(&config));
        Self {
            config,
            source,
            submitter,
            balance,
            rate_limit_active: false,
        }
    }

    #[cfg(test)]
    fn with_parts(
        config: Config,
        source: Box<dyn PositionSource>,
        submitter: Option<Box<dyn RedeemSubmitter>>,
    ) -> Self {
        Self {
            config,
            source,
            submitter,
            balance: None,
            rate_limit_active: false,
        }
    }

    /// One full pass: balance, fetch, dedupe, claim, fallback. Any transport
    /// error aborts this cycle only; the loop driver catches it.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let account = self.config.claim_account()?;

        let balance = match &self.balance {
            Some(client) => Some(client.usdc_balance(&account).await?),
            None => None,
        };

        let positions = self.source.fetch_redeemable(&account).await?;
        let condition_ids = dedupe_condition_ids(&positions);

        let mut report = CycleReport {
            started_at: Utc::now(),
            balance,
            positions,
            markets: condition_ids.len(),
            relay: None,
            sells: Vec::new(),
        };

        if condition_ids.is_empty() {
            return Ok(report);
        }

        if let Some(submitter) = &self.submitter {
            info!(
                "Submitting {} market(s) via {}",
                condition_ids.len(),
                submitter.describe()
            );
            report.relay = Some(submitter.submit_batch(&condition_ids).await);
        }

        // Fallback runs on its own switch, independent of the relay outcome
        if self.config.use_clob_sell {
            let sells = clob_sell::liquidate(&self.config, &report.positions).await;
            report.sells = sells;
        }

        Ok(report)
    }

    /// Fold a finished cycle into the cross-cycle state
    fn absorb(&mut self, report: &CycleReport) {
        if report.relay_succeeded() {
            self.rate_limit_active = false;
        } else if report.rate_limited() {
            self.rate_limit_active = true;
        }
    }

    /// Print the cycle summary. Printing never fails.
    fn print_report(&self, report: &CycleReport) {
        println!("\n--- Cycle at {} ---", report.started_at.format("%H:%M:%S"));
        if let Some(balance) = report.balance {
            println!("  Cash: {:.2} USDC", balance);
        }

        if report.markets == 0 {
            println!("  0 claimable positions. Nothing to do.");
        } else {
            println!(
                "  Claimable: {} position(s) across {} market(s)",
                report.positions.len(),
                report.markets
            );
            for line in position_lines(&report.positions) {
                println!("    {}", line);
            }
        }

        if let Some(outcome) = &report.relay {
            let line = outcome.to_string();
            if outcome.is_success() {
                println!("  Relay: {}", line.green());
            } else if outcome.is_rate_limited() {
                println!("  Relay: {}", line.yellow());
            } else {
                println!("  Relay: {}", line.red());
            }
        }

        for sell in &report.sells {
            if sell.ok {
                println!(
                    "  Sell placed: \"{}\" (order {})",
                    sell.title,
                    sell.order_id.as_deref().unwrap_or("?")
                );
            } else {
                println!(
                    "  Sell failed: \"{}\" ({})",
                    sell.title,
                    sell.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        if self.rate_limit_active {
            println!(
                "  {}",
                format!(
                    "Relay quota exhausted; still retrying every {}",
                    format_duration_secs(self.config.loop_wait_seconds)
                )
                .yellow()
            );
        }

        if report.needs_manual_claim() {
            println!(
                "  {}",
                "Claim manually: polymarket.com -> Portfolio -> Claim".yellow()
            );
        }
    }

    /// The supervising loop. Cycles run on a fixed schedule forever; ctrl-c
    /// exits cleanly whether it lands mid-cycle or during the sleep.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Loop driver with the interrupt injected, so shutdown can be tested
    /// without raising a real signal.
    async fn run_until<F: Future>(&mut self, interrupt: F) -> Result<()> {
        tokio::pin!(interrupt);
        loop {
            let outcome = tokio::select! {
                outcome = self.run_cycle() => outcome,
                _ = &mut interrupt => {
                    println!("\nInterrupted.");
                    return Ok(());
                }
            };

            match outcome {
                Ok(report) => {
                    self.absorb(&report);
                    self.print_report(&report);
                }
                Err(e) => {
                    error!("Cycle failed: {}", truncate_chars(&format!("{:#}", e), 200));
                }
            }

            if self.config.run_once {
                info!("Single pass complete.");
                return Ok(());
            }

            let delay = Duration::from_secs(self.config.loop_wait_seconds);
            info!(
                "Next cycle in {}",
                format_duration_secs(self.config.loop_wait_seconds)
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut interrupt => {
                    println!("\nInterrupted.");
                    return Ok(());
                }
            }
        }
    }
}

/// Listing lines for the report: numbered, truncated titles, capped with an
/// overflow line
fn position_lines(positions: &[RedeemablePosition]) -> Vec<String> {
    let mut lines: Vec<String> = positions
        .iter()
        .take(REPORT_LIST_CAP)
        .enumerate()
        .map(|(i, p)| format!("{}. \"{}\" ({} shares)", i + 1, p.short_label(60), p.quantity()))
        .collect();
    if positions.len() > REPORT_LIST_CAP {
        lines.push(format!("... and {} more", positions.len() - REPORT_LIST_CAP));
    }
    lines
}
