//! The strategy loop.
//!
//! One cycle: account drift check, open-position census, scan + rank +
//! build at most one spread, then a read-only review of open positions.
//! Cycle errors are recoverable; only startup authentication is fatal.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::SpreadError;
use crate::exchange::{OptionsGateway, TradeDirection};
use crate::persistence::TradeLog;
use crate::strategy::builder::SpreadBuilder;
use crate::strategy::scanner::{rank_opportunities, Opportunity, OpportunityScanner};
use crate::utils::decimal::safe_div;

/// Warn when account equity drifts this far from configured capital.
const EQUITY_DRIFT_WARN: Decimal = dec!(0.10);

/// What one cycle did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub open_options: usize,
    pub opportunities_found: usize,
    pub spread_submitted: bool,
}

/// Drives scanning and spread execution on a fixed cadence.
pub struct StrategyEngine {
    gateway: Arc<dyn OptionsGateway>,
    config: Config,
    scanner: OpportunityScanner,
    builder: SpreadBuilder,
    trade_log: Option<TradeLog>,
}

impl StrategyEngine {
    pub fn new(
        gateway: Arc<dyn OptionsGateway>,
        config: Config,
        trade_log: Option<TradeLog>,
    ) -> Self {
        let scanner = OpportunityScanner::new(config.volatility.clone(), config.strategy.clone());
        let builder = SpreadBuilder::new(
            config.strategy.clone(),
            config.capital.per_position_budget(),
        );
        Self {
            gateway,
            config,
            scanner,
            builder,
            trade_log,
        }
    }

    /// Run until the shutdown flag is raised.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.gateway
            .authenticate()
            .await
            .context("startup authentication failed")?;
        info!("authenticated, entering strategy loop");

        while !shutdown.load(Ordering::SeqCst) {
            let started = Utc::now();
            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        open_options = report.open_options,
                        opportunities = report.opportunities_found,
                        submitted = report.spread_submitted,
                        elapsed_ms = (Utc::now() - started).num_milliseconds(),
                        "cycle complete"
                    );
                    sleep_interruptible(self.config.schedule.poll_interval_secs, &shutdown).await;
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "cycle failed, backing off");
                    sleep_interruptible(self.config.schedule.recovery_interval_secs, &shutdown)
                        .await;
                }
            }
        }

        info!("shutdown flag raised, strategy loop stopped");
        Ok(())
    }

    /// One pass over every tracked underlying.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.check_account_drift()
            .await
            .context("account status check")?;

        let open_options = self
            .count_open_options()
            .await
            .context("open position count")?;

        let mut report = CycleReport {
            open_options,
            ..CycleReport::default()
        };

        if open_options < self.config.capital.max_positions as usize {
            let opportunities = self.scan_all().await.context("opportunity scan")?;
            report.opportunities_found = opportunities.len();
            report.spread_submitted = self.execute_best(opportunities).await;
        } else {
            info!(
                open_options,
                max = self.config.capital.max_positions,
                "position limit reached, skipping scan"
            );
        }

        self.review_positions().await.context("position review")?;

        Ok(report)
    }

    /// Warn when total account equity drifts beyond the configured capital.
    async fn check_account_drift(&self) -> Result<()> {
        let mut total_usd = Decimal::ZERO;
        for underlying in &self.config.strategy.underlyings {
            let summary = self.gateway.get_account_summary(underlying).await?;
            if let Some(usd) = summary.equity_usd {
                total_usd += usd;
            }
        }

        if total_usd > Decimal::ZERO {
            let configured = self.config.capital.total_capital;
            if let Some(drift) = safe_div(total_usd - configured, configured) {
                if drift.abs() > EQUITY_DRIFT_WARN {
                    warn!(
                        equity_usd = %total_usd,
                        configured = %configured,
                        drift_pct = %(drift * dec!(100)).round_dp(1),
                        "account equity drifted from configured capital"
                    );
                }
            }
        }
        Ok(())
    }

    async fn count_open_options(&self) -> Result<usize> {
        let mut count = 0;
        for underlying in &self.config.strategy.underlyings {
            let positions = self.gateway.list_open_positions(underlying).await?;
            count += positions
                .iter()
                .filter(|p| p.is_option() && !p.size.is_zero())
                .count();
        }
        Ok(count)
    }

    async fn scan_all(&self) -> Result<Vec<Opportunity>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut all = Vec::new();
        for underlying in &self.config.strategy.underlyings {
            let mut found = self
                .scanner
                .scan(self.gateway.as_ref(), underlying, now_ms)
                .await
                .with_context(|| format!("scanning {underlying}"))?;
            all.append(&mut found);
        }
        Ok(all)
    }

    /// Build one spread for the single best candidate. Per-trade failures
    /// are logged and absorbed; the cycle itself keeps going.
    async fn execute_best(&self, opportunities: Vec<Opportunity>) -> bool {
        let ranked = rank_opportunities(opportunities);
        let Some(best) = ranked.first() else {
            return false;
        };

        info!(
            instrument = %best.instrument_name,
            ratio = best.ratio,
            direction = ?best.direction,
            "best candidate selected"
        );

        let plan = self.builder.plan(best);
        match self.builder.build(self.gateway.as_ref(), plan).await {
            Ok(executed) => {
                if let Some(log) = &self.trade_log {
                    if let Err(err) = log.record_spread(&executed) {
                        error!(error = %format!("{err:#}"), "failed to persist executed spread");
                    }
                }
                true
            }
            Err(err) if err.is_partial_fill() => {
                error!(error = %err, "PARTIAL SPREAD: one leg may rest on the venue");
                false
            }
            Err(SpreadError::BudgetExceeded { net_cost, budget }) => {
                warn!(%net_cost, %budget, "best candidate over budget, no trade this cycle");
                false
            }
            Err(err) => {
                warn!(error = %err, "spread construction failed");
                false
            }
        }
    }

    /// Log P&L of open option positions against the exit fractions.
    /// Observation only; no orders are placed here.
    async fn review_positions(&self) -> Result<()> {
        for underlying in &self.config.strategy.underlyings {
            let positions = self.gateway.list_open_positions(underlying).await?;
            for position in positions.iter().filter(|p| p.is_option()) {
                let Some(raw) = safe_div(
                    position.mark_price - position.average_price,
                    position.average_price,
                ) else {
                    warn!(
                        instrument = %position.instrument_name,
                        "position has zero entry price, skipping review"
                    );
                    continue;
                };
                let pnl_pct = match position.direction {
                    TradeDirection::Buy => raw,
                    TradeDirection::Sell => -raw,
                };

                let at_profit_target = pnl_pct >= self.config.strategy.profit_target_pct;
                let at_stop_loss = pnl_pct <= -self.config.strategy.stop_loss_pct;
                info!(
                    instrument = %position.instrument_name,
                    size = %position.size,
                    pnl_pct = %(pnl_pct * dec!(100)).round_dp(2),
                    at_profit_target,
                    at_stop_loss,
                    "position review"
                );
            }
        }
        Ok(())
    }
}

/// Sleep in one-second slices so shutdown stays responsive.
async fn sleep_interruptible(secs: u64, shutdown: &AtomicBool) {
    for _ in 0..secs {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
