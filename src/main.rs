//! Volatility-arbitrage options trader - main entry point.
//!
//! Scans Deribit option chains for IV/HV mispricings and opens
//! defined-risk vertical spreads on a fixed cadence.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use vol_arb_trader::config::Config;
use vol_arb_trader::exchange::{DeribitClient, OptionsGateway};
use vol_arb_trader::persistence::TradeLog;
use vol_arb_trader::strategy::{rank_opportunities, OpportunityScanner, StrategyEngine};

/// Volatility arbitrage trader CLI
#[derive(Parser)]
#[command(name = "vol-arb-trader")]
#[command(version, about = "Volatility-arbitrage vertical spreads on Deribit options")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot opportunity scan, no orders placed
    Scan {
        /// Underlyings to scan (default: the configured set)
        #[arg(short, long)]
        underlying: Option<Vec<String>>,
    },

    /// Show recent spreads from the trade log
    History {
        /// Path to SQLite trade log
        #[arg(short, long, default_value = "data/trades.db")]
        db: String,

        /// Number of spreads to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Some(Commands::Scan { underlying }) => {
            return run_scan(&config, underlying).await;
        }
        Some(Commands::History { db, limit }) => {
            return show_history(&db, limit);
        }
        None => {
            // Default: run the trading loop
        }
    }

    info!(
        "🚀 vol-arb-trader v{} starting{}",
        env!("CARGO_PKG_VERSION"),
        if config.deribit.testnet {
            " (testnet)"
        } else {
            ""
        }
    );
    log_config(&config);
    if !config.deribit.testnet {
        warn!("⚠️  Production venue selected, real orders will be placed");
    }

    std::fs::create_dir_all("data")?;
    let trade_log = TradeLog::new("data/trades.db")?;

    let gateway: Arc<dyn OptionsGateway> = Arc::new(DeribitClient::new(&config.deribit)?);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("ctrl-c received, finishing current cycle");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let engine = StrategyEngine::new(gateway, config, Some(trade_log));
    engine.run(shutdown).await?;

    info!("👋 vol-arb-trader shutdown complete");
    Ok(())
}

/// One scan pass over the chain, printing ranked opportunities.
async fn run_scan(config: &Config, underlyings: Option<Vec<String>>) -> Result<()> {
    let gateway = DeribitClient::new(&config.deribit)?;
    gateway.authenticate().await?;

    let scanner = OpportunityScanner::new(config.volatility.clone(), config.strategy.clone());
    let targets = underlyings.unwrap_or_else(|| config.strategy.underlyings.clone());
    let now_ms = Utc::now().timestamp_millis();

    let mut all = Vec::new();
    for underlying in &targets {
        let mut found = scanner
            .scan(&gateway, underlying, now_ms)
            .await
            .with_context(|| format!("scanning {underlying}"))?;
        all.append(&mut found);
    }

    let ranked = rank_opportunities(all);
    if ranked.is_empty() {
        println!("No opportunities found across {targets:?}");
        return Ok(());
    }

    println!(
        "{:<28} {:>6} {:>8} {:>8} {:>7} {:>6}",
        "INSTRUMENT", "DIR", "IV", "HV", "RATIO", "DTE"
    );
    for o in ranked {
        println!(
            "{:<28} {:>6} {:>8.4} {:>8.4} {:>7.3} {:>6}",
            o.instrument_name,
            format!("{:?}", o.direction).to_lowercase(),
            o.iv,
            o.hv,
            o.ratio,
            o.days_to_expiry
        );
    }
    Ok(())
}

/// Print the most recent spreads from the trade log.
fn show_history(db_path: &str, limit: usize) -> Result<()> {
    let log = TradeLog::new(db_path)?;
    let records = log.recent(limit)?;

    if records.is_empty() {
        println!("Trade log is empty");
        return Ok(());
    }

    println!("{} spread(s), newest first:", records.len());
    for r in records {
        println!(
            "{} [{}] buy {} @ {} / sell {} @ {} x{} net {}",
            r.executed_at.format("%Y-%m-%d %H:%M:%S"),
            r.kind,
            r.buy_instrument,
            r.buy_price,
            r.sell_instrument,
            r.sell_price,
            r.amount,
            r.net_cost
        );
    }
    Ok(())
}

/// Initialize logging with file output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "vol-arb-trader.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vol_arb_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log the effective configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Underlyings: {:?}", config.strategy.underlyings);
    info!(
        "   Capital: ${} total, {} active, ${} per position",
        config.capital.total_capital,
        config.capital.active_fraction,
        config.capital.per_position_budget()
    );
    info!("   Max positions: {}", config.capital.max_positions);
    info!(
        "   HV windows: {}/{}/{} weighted {}/{}/{}",
        config.volatility.window_short,
        config.volatility.window_medium,
        config.volatility.window_long,
        config.volatility.weight_short,
        config.volatility.weight_medium,
        config.volatility.weight_long
    );
    info!(
        "   IV/HV thresholds: sell above {}, buy below {}",
        config.strategy.iv_hv_high_threshold, config.strategy.iv_hv_low_threshold
    );
    info!(
        "   Expiry window: {}-{} days, strike offset {}",
        config.strategy.min_days_to_expiry,
        config.strategy.max_days_to_expiry,
        config.strategy.strike_offset_pct
    );
    info!(
        "   Cycle every {}s, recovery after {}s",
        config.schedule.poll_interval_secs, config.schedule.recovery_interval_secs
    );
}
