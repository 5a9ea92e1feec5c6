//! SQLite record of submitted spreads.
//!
//! Every executed vertical spread is appended to the trade log so a
//! restart keeps the trading history. The `history` CLI command reads the
//! same table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::strategy::ExecutedSpread;

/// One row of the trade log.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub id: i64,
    pub executed_at: DateTime<Utc>,
    pub kind: String,
    pub underlying: String,
    pub buy_instrument: String,
    pub sell_instrument: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub net_cost: Decimal,
    pub amount: Decimal,
    pub buy_order_id: String,
    pub sell_order_id: String,
}

/// Append-only SQLite log of executed spreads.
pub struct TradeLog {
    conn: Connection,
}

impl TradeLog {
    /// Open the log, creating the database and schema if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open trade log at {:?}", db_path.as_ref()))?;

        let log = Self { conn };
        log.init_schema()?;

        info!("Trade log opened at {:?}", db_path.as_ref());
        Ok(log)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS spreads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                executed_at TEXT NOT NULL,
                kind TEXT NOT NULL,
                underlying TEXT NOT NULL,
                buy_instrument TEXT NOT NULL,
                sell_instrument TEXT NOT NULL,
                buy_price TEXT NOT NULL,
                sell_price TEXT NOT NULL,
                net_cost TEXT NOT NULL,
                amount TEXT NOT NULL,
                buy_order_id TEXT NOT NULL,
                sell_order_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_spreads_executed_at ON spreads(executed_at);
            CREATE INDEX IF NOT EXISTS idx_spreads_underlying ON spreads(underlying);
            "#,
        )?;
        debug!("Trade log schema initialized");
        Ok(())
    }

    /// Append one executed spread.
    pub fn record_spread(&self, spread: &ExecutedSpread) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO spreads (executed_at, kind, underlying, buy_instrument, sell_instrument,
                                 buy_price, sell_price, net_cost, amount, buy_order_id, sell_order_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                spread.executed_at.to_rfc3339(),
                spread.plan.kind.as_str(),
                spread.plan.underlying,
                spread.plan.buy_instrument,
                spread.plan.sell_instrument,
                spread.buy_price.to_string(),
                spread.sell_price.to_string(),
                spread.net_cost.to_string(),
                spread.plan.amount.to_string(),
                spread.buy_order_id,
                spread.sell_order_id,
            ],
        )?;
        Ok(())
    }

    /// Most recent spreads, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, executed_at, kind, underlying, buy_instrument, sell_instrument,
                   buy_price, sell_price, net_cost, amount, buy_order_id, sell_order_id
            FROM spreads
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let records: Vec<TradeRecord> = stmt
            .query_map([limit], |row| {
                let ts: String = row.get(1)?;
                Ok(TradeRecord {
                    id: row.get(0)?,
                    executed_at: DateTime::parse_from_rfc3339(&ts)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    kind: row.get(2)?,
                    underlying: row.get(3)?,
                    buy_instrument: row.get(4)?,
                    sell_instrument: row.get(5)?,
                    buy_price: Decimal::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
                    sell_price: Decimal::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
                    net_cost: Decimal::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
                    amount: Decimal::from_str(&row.get::<_, String>(9)?).unwrap_or_default(),
                    buy_order_id: row.get(10)?,
                    sell_order_id: row.get(11)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Total number of recorded spreads.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM spreads", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{SpreadKind, SpreadPlan};
    use rust_decimal_macros::dec;

    fn make_spread(net_cost: Decimal) -> ExecutedSpread {
        ExecutedSpread {
            plan: SpreadPlan {
                kind: SpreadKind::BearCall,
                underlying: "BTC".to_string(),
                expiry_code: "26SEP25".to_string(),
                buy_instrument: "BTC-26SEP25-68250-C".to_string(),
                sell_instrument: "BTC-26SEP25-65000-C".to_string(),
                buy_strike: dec!(68250),
                sell_strike: dec!(65000),
                amount: dec!(0.01),
            },
            buy_price: dec!(1700),
            sell_price: dec!(3200),
            net_cost,
            buy_order_id: "1".to_string(),
            sell_order_id: "2".to_string(),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let log = TradeLog::new(":memory:").unwrap();
        log.record_spread(&make_spread(dec!(-15))).unwrap();

        let records = log.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "bear_call");
        assert_eq!(records[0].net_cost, dec!(-15));
        assert_eq!(records[0].buy_instrument, "BTC-26SEP25-68250-C");
        assert_eq!(log.count().unwrap(), 1);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let log = TradeLog::new(":memory:").unwrap();
        for i in 0..5 {
            log.record_spread(&make_spread(Decimal::new(-i, 0))).unwrap();
        }

        let records = log.recent(3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].net_cost, dec!(-4));
        assert_eq!(records[2].net_cost, dec!(-2));
    }
}
