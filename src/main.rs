//! Polymarket Claim Bot CLI
//!
//! Claims resolved Polymarket positions automatically.

use anyhow::Result;
use clap::{Parser, Subcommand};
use claimbot::services::BalanceClient;
use claimbot::{build_redeem_tx, dedupe_condition_ids, Config, DataApiClient, Orchestrator};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "claimbot")]
#[command(about = "Automatic claimer for resolved Polymarket positions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the claim loop
    Run {
        /// Claim once and exit instead of looping
        #[arg(long)]
        once: bool,
    },

    /// List redeemable positions without claiming anything
    Positions,

    /// Show the account's USDC balance
    Balance,

    /// Print the redemption calldata for one market (for manual submission)
    Encode {
        /// Condition id, 0x-prefixed hex
        condition_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run { once } => run_bot(Config::from_env()?, once).await?,
        Commands::Positions => show_positions(&Config::from_env()?).await?,
        Commands::Balance => show_balance(&Config::from_env()?).await?,
        // Encoding is pure; it works without any configuration at all
        Commands::Encode { condition_id } => encode_redemption(&condition_id)?,
    }

    Ok(())
}

async fn run_bot(mut config: Config, once: bool) -> Result<()> {
    config.run_once = config.run_once || once;
    let account = config.claim_account()?;

    println!("\n{}", "=".repeat(70));
    println!("  POLYMARKET CLAIM BOT");
    println!("  Account: {}", account);
    println!(
        "  Custody: {} | Relay: {} | CLOB sell: {}",
        config.custody,
        if config.use_relayer { "ON" } else { "OFF" },
        if config.use_clob_sell { "ON" } else { "OFF" }
    );
    if config.run_once {
        println!("  Single pass");
    } else {
        println!("  Cycle delay: {}s", config.loop_wait_seconds);
    }
    println!("{}\n", "=".repeat(70));

    // Warm-up balance check surfaces bad RPC/proxy settings before the first cycle
    let balance = BalanceClient::new(&config);
    match balance.usdc_balance(&account).await {
        Ok(cash) => println!("Starting cash: {:.2} USDC", cash),
        Err(e) => warn!("Balance check failed at startup: {:#}", e),
    }

    let mut orchestrator = Orchestrator::new(config);
    orchestrator.run().await
}

async fn show_positions(config: &Config) -> Result<()> {
    let account = config.claim_account()?;
    let client = DataApiClient::new(config);
    let positions = client.fetch_redeemable(&account).await?;

    if positions.is_empty() {
        println!("No redeemable positions.");
        return Ok(());
    }

    println!("REDEEMABLE POSITIONS");
    println!("{}", "-".repeat(70));

    for (i, position) in positions.iter().enumerate() {
        println!("\n{}. \"{}\"", i + 1, position.short_label(60));
        println!(
            "   Outcome: {} | Shares: {}",
            position.outcome.as_deref().unwrap_or("?"),
            position.quantity()
        );
        println!("   Market: {}", position.condition_id);
    }

    let markets = dedupe_condition_ids(&positions);
    println!("\n{}", "-".repeat(70));
    println!(
        "Total: {} position(s) across {} market(s)",
        positions.len(),
        markets.len()
    );

    Ok(())
}

async fn show_balance(config: &Config) -> Result<()> {
    let account = config.claim_account()?;
    let client = BalanceClient::new(config);
    let balance = client.usdc_balance(&account).await?;

    println!("Account: {}", account);
    println!("USDC:    {:.2}", balance);

    Ok(())
}

fn encode_redemption(condition_id: &str) -> Result<()> {
    let tx = build_redeem_tx(condition_id)?;

    println!("To:    {}", tx.to);
    println!("Value: {}", tx.value);
    println!("Data:  {}", tx.data);

    Ok(())
}
