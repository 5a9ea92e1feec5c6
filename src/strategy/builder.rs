//! Vertical spread planning and execution.
//!
//! A plan is pure arithmetic over an opportunity; execution prices the two
//! legs off the live book, enforces the per-position budget before touching
//! the venue, and submits two limit orders. Leg one is bought first; if the
//! sell leg then fails, the resting buy order is canceled best-effort and
//! the partial fill is surfaced as its own error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::config::StrategyConfig;
use crate::error::SpreadError;
use crate::exchange::{instrument_name, OptionType, OptionsGateway, OrderKind, TradeDirection};
use crate::strategy::scanner::Opportunity;
use crate::utils::decimal::round_to_tick;

/// The four vertical spread shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadKind {
    BullCall,
    BearCall,
    BullPut,
    BearPut,
}

impl SpreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpreadKind::BullCall => "bull_call",
            SpreadKind::BearCall => "bear_call",
            SpreadKind::BullPut => "bull_put",
            SpreadKind::BearPut => "bear_put",
        }
    }
}

/// A fully specified spread before any order is placed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadPlan {
    pub kind: SpreadKind,
    pub underlying: String,
    pub expiry_code: String,
    pub buy_instrument: String,
    pub sell_instrument: String,
    pub buy_strike: Decimal,
    pub sell_strike: Decimal,
    /// Contract amount of each leg
    pub amount: Decimal,
}

/// A spread whose two legs were acknowledged by the venue.
#[derive(Debug, Clone)]
pub struct ExecutedSpread {
    pub plan: SpreadPlan,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// `(buy - sell) * amount`: positive is a debit, negative a credit
    pub net_cost: Decimal,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub executed_at: DateTime<Utc>,
}

/// Plans and executes vertical spreads against a per-position budget.
pub struct SpreadBuilder {
    strategy: StrategyConfig,
    budget: Decimal,
}

impl SpreadBuilder {
    pub fn new(strategy: StrategyConfig, budget: Decimal) -> Self {
        Self { strategy, budget }
    }

    /// Map an opportunity to a spread shape and its two legs.
    ///
    /// The companion strike sits `strike_offset_pct` away from the
    /// opportunity strike, rounded to the venue's strike tick.
    pub fn plan(&self, opportunity: &Opportunity) -> SpreadPlan {
        let strike = opportunity.strike;
        let tick = self.strategy.strike_tick(&opportunity.underlying);
        let offset = round_to_tick(strike * self.strategy.strike_offset_pct, tick);

        let (kind, low_strike, high_strike) = match (opportunity.direction, opportunity.option_type)
        {
            (TradeDirection::Sell, OptionType::Call) => {
                (SpreadKind::BearCall, strike, strike + offset)
            }
            (TradeDirection::Sell, OptionType::Put) => {
                (SpreadKind::BearPut, strike - offset, strike)
            }
            (TradeDirection::Buy, OptionType::Call) => {
                (SpreadKind::BullCall, strike, strike + offset)
            }
            (TradeDirection::Buy, OptionType::Put) => {
                (SpreadKind::BullPut, strike - offset, strike)
            }
        };

        // Bull call and bear put buy the low strike's side counterpart:
        // the bought leg is low for the bull shapes, high for the bears.
        let (buy_strike, sell_strike) = match kind {
            SpreadKind::BullCall | SpreadKind::BullPut => (low_strike, high_strike),
            SpreadKind::BearCall | SpreadKind::BearPut => (high_strike, low_strike),
        };

        let option_type = opportunity.option_type;
        SpreadPlan {
            kind,
            underlying: opportunity.underlying.clone(),
            expiry_code: opportunity.expiry_code.clone(),
            buy_instrument: instrument_name(
                &opportunity.underlying,
                &opportunity.expiry_code,
                buy_strike,
                option_type,
            ),
            sell_instrument: instrument_name(
                &opportunity.underlying,
                &opportunity.expiry_code,
                sell_strike,
                option_type,
            ),
            buy_strike,
            sell_strike,
            amount: self.strategy.contract_size(&opportunity.underlying),
        }
    }

    /// Price and submit both legs of a planned spread.
    ///
    /// The budget check happens strictly before the first submission: a
    /// rejected spread leaves the venue untouched.
    #[instrument(skip(self, gateway), fields(kind = plan.kind.as_str()))]
    pub async fn build(
        &self,
        gateway: &dyn OptionsGateway,
        plan: SpreadPlan,
    ) -> Result<ExecutedSpread, SpreadError> {
        let buy_book = gateway.get_order_book(&plan.buy_instrument, 1).await?;
        let buy_price = buy_book.best_ask.ok_or_else(|| SpreadError::EmptyBook {
            instrument: plan.buy_instrument.clone(),
            side: "ask",
        })?;

        let sell_book = gateway.get_order_book(&plan.sell_instrument, 1).await?;
        let sell_price = sell_book.best_bid.ok_or_else(|| SpreadError::EmptyBook {
            instrument: plan.sell_instrument.clone(),
            side: "bid",
        })?;

        let net_cost = (buy_price - sell_price) * plan.amount;
        if net_cost.abs() > self.budget {
            warn!(
                %net_cost,
                budget = %self.budget,
                "spread rejected before submission"
            );
            return Err(SpreadError::BudgetExceeded {
                net_cost,
                budget: self.budget,
            });
        }

        let buy_label = format!("spread_{}_buy", plan.kind.as_str());
        let buy_ack = gateway
            .submit_order(
                &plan.buy_instrument,
                plan.amount,
                OrderKind::Limit,
                Some(buy_price),
                Some(&buy_label),
            )
            .await?;

        let sell_label = format!("spread_{}_sell", plan.kind.as_str());
        let sell_result = gateway
            .submit_order(
                &plan.sell_instrument,
                -plan.amount,
                OrderKind::Limit,
                Some(sell_price),
                Some(&sell_label),
            )
            .await;

        let sell_ack = match sell_result {
            Ok(ack) => ack,
            Err(source) => {
                error!(
                    buy_instrument = %plan.buy_instrument,
                    sell_instrument = %plan.sell_instrument,
                    error = %source,
                    "sell leg failed after buy leg, canceling buy order"
                );
                let canceled = match gateway.cancel_order(&buy_ack.order_id).await {
                    Ok(()) => true,
                    Err(cancel_err) => {
                        error!(
                            order_id = %buy_ack.order_id,
                            error = %cancel_err,
                            "cancel of buy leg failed, naked leg may rest on venue"
                        );
                        false
                    }
                };
                return Err(SpreadError::PartialFill {
                    filled_instrument: plan.buy_instrument.clone(),
                    filled_order_id: buy_ack.order_id,
                    failed_instrument: plan.sell_instrument.clone(),
                    canceled,
                    source,
                });
            }
        };

        info!(
            buy_instrument = %plan.buy_instrument,
            sell_instrument = %plan.sell_instrument,
            %buy_price,
            %sell_price,
            %net_cost,
            "vertical spread submitted"
        );

        Ok(ExecutedSpread {
            plan,
            buy_price,
            sell_price,
            net_cost,
            buy_order_id: buy_ack.order_id,
            sell_order_id: sell_ack.order_id,
            executed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockGateway;
    use rust_decimal_macros::dec;

    fn make_opportunity(
        strike: Decimal,
        option_type: OptionType,
        direction: TradeDirection,
    ) -> Opportunity {
        let name = instrument_name("BTC", "26SEP25", strike, option_type);
        Opportunity {
            instrument_name: name,
            underlying: "BTC".to_string(),
            expiry_code: "26SEP25".to_string(),
            strike,
            option_type,
            expiration_timestamp: 0,
            days_to_expiry: 14,
            iv: 0.6,
            hv: 0.4,
            ratio: 1.5,
            direction,
        }
    }

    fn builder(budget: Decimal) -> SpreadBuilder {
        SpreadBuilder::new(StrategyConfig::default(), budget)
    }

    #[test]
    fn test_plan_bear_call_from_rich_call() {
        // IV 0.60 over HV 0.40 on the 65000 call: sell the call, buy the
        // 5%-higher companion, 65000 * 1.05 = 68250 on the 250 tick.
        let opportunity = make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
        let plan = builder(dec!(15)).plan(&opportunity);

        assert_eq!(plan.kind, SpreadKind::BearCall);
        assert_eq!(plan.sell_strike, dec!(65000));
        assert_eq!(plan.buy_strike, dec!(68250));
        assert_eq!(plan.sell_instrument, "BTC-26SEP25-65000-C");
        assert_eq!(plan.buy_instrument, "BTC-26SEP25-68250-C");
        assert_eq!(plan.amount, dec!(0.01));
    }

    #[test]
    fn test_plan_shapes_for_all_quadrants() {
        let cases = [
            (TradeDirection::Sell, OptionType::Call, SpreadKind::BearCall),
            (TradeDirection::Sell, OptionType::Put, SpreadKind::BearPut),
            (TradeDirection::Buy, OptionType::Call, SpreadKind::BullCall),
            (TradeDirection::Buy, OptionType::Put, SpreadKind::BullPut),
        ];
        for (direction, option_type, kind) in cases {
            let plan = builder(dec!(15)).plan(&make_opportunity(dec!(60000), option_type, direction));
            assert_eq!(plan.kind, kind);
        }
    }

    #[test]
    fn test_plan_put_spreads_offset_downward() {
        let opportunity = make_opportunity(dec!(65000), OptionType::Put, TradeDirection::Buy);
        let plan = builder(dec!(15)).plan(&opportunity);

        // Bull put: buy the low strike, sell the opportunity strike.
        assert_eq!(plan.kind, SpreadKind::BullPut);
        assert_eq!(plan.buy_strike, dec!(61750));
        assert_eq!(plan.sell_strike, dec!(65000));
        assert_eq!(plan.buy_instrument, "BTC-26SEP25-61750-P");
    }

    #[test]
    fn test_plan_rounds_offset_to_eth_tick() {
        let mut opportunity = make_opportunity(dec!(1790), OptionType::Call, TradeDirection::Sell);
        opportunity.underlying = "ETH".to_string();
        opportunity.instrument_name = "ETH-26SEP25-1790-C".to_string();
        let plan = builder(dec!(15)).plan(&opportunity);

        // 1790 * 0.05 = 89.5, nearest 25 tick is 100.
        assert_eq!(plan.buy_strike, dec!(1890));
        assert_eq!(plan.amount, dec!(0.1));
    }

    #[test]
    fn test_credit_spread_within_budget_submits_both_legs() {
        tokio_test::block_on(async {
            let gateway = MockGateway::new();
            let opportunity = make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
            let b = builder(dec!(15));
            let plan = b.plan(&opportunity);

            gateway.set_book(&plan.buy_instrument, None, Some(dec!(1700))).await;
            gateway.set_book(&plan.sell_instrument, Some(dec!(3200)), None).await;

            let executed = b.build(&gateway, plan.clone()).await.unwrap();
            // (1700 - 3200) * 0.01 = -15: a credit exactly at budget.
            assert_eq!(executed.net_cost, dec!(-15.00));

            let orders = gateway.submitted_orders().await;
            assert_eq!(orders.len(), 2);
            assert_eq!(orders[0].instrument_name, plan.buy_instrument);
            assert_eq!(orders[0].amount, dec!(0.01));
            assert_eq!(orders[0].limit_price, Some(dec!(1700)));
            assert_eq!(orders[0].label.as_deref(), Some("spread_bear_call_buy"));
            assert_eq!(orders[1].instrument_name, plan.sell_instrument);
            assert_eq!(orders[1].amount, dec!(-0.01));
            assert_eq!(orders[1].limit_price, Some(dec!(3200)));
            assert_eq!(orders[1].label.as_deref(), Some("spread_bear_call_sell"));
        });
    }

    #[test]
    fn test_budget_exceeded_submits_nothing() {
        tokio_test::block_on(async {
            let gateway = MockGateway::new();
            let opportunity = make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
            let b = builder(dec!(10));
            let plan = b.plan(&opportunity);

            gateway.set_book(&plan.buy_instrument, None, Some(dec!(1700))).await;
            gateway.set_book(&plan.sell_instrument, Some(dec!(3200)), None).await;

            let err = b.build(&gateway, plan).await.unwrap_err();
            assert!(matches!(
                err,
                SpreadError::BudgetExceeded { net_cost, budget }
                    if net_cost == dec!(-15.00) && budget == dec!(10)
            ));
            assert!(gateway.submitted_orders().await.is_empty());
        });
    }

    #[test]
    fn test_empty_book_aborts_before_any_order() {
        tokio_test::block_on(async {
            let gateway = MockGateway::new();
            let opportunity = make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
            let b = builder(dec!(15));
            let plan = b.plan(&opportunity);

            gateway.set_book(&plan.buy_instrument, Some(dec!(1600)), None).await;
            gateway.set_book(&plan.sell_instrument, Some(dec!(3200)), None).await;

            let err = b.build(&gateway, plan).await.unwrap_err();
            assert!(matches!(err, SpreadError::EmptyBook { side: "ask", .. }));
            assert!(gateway.submitted_orders().await.is_empty());
        });
    }

    #[test]
    fn test_sell_leg_failure_cancels_buy_leg() {
        tokio_test::block_on(async {
            let gateway = MockGateway::new();
            gateway.fail_submissions_after(1).await;

            let opportunity = make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
            let b = builder(dec!(15));
            let plan = b.plan(&opportunity);

            gateway.set_book(&plan.buy_instrument, None, Some(dec!(1700))).await;
            gateway.set_book(&plan.sell_instrument, Some(dec!(3200)), None).await;

            let err = b.build(&gateway, plan.clone()).await.unwrap_err();
            assert!(err.is_partial_fill());

            let orders = gateway.submitted_orders().await;
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].instrument_name, plan.buy_instrument);

            match err {
                SpreadError::PartialFill {
                    filled_order_id,
                    canceled,
                    ..
                } => {
                    assert!(canceled);
                    assert_eq!(gateway.canceled_orders().await, vec![filled_order_id]);
                }
                other => panic!("expected PartialFill, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_budget_is_never_violated_for_random_books() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        tokio_test::block_on(async {
            let mut rng = StdRng::seed_from_u64(7);
            let budget = dec!(15);

            for _ in 0..200 {
                let gateway = MockGateway::new();
                let opportunity =
                    make_opportunity(dec!(65000), OptionType::Call, TradeDirection::Sell);
                let b = builder(budget);
                let plan = b.plan(&opportunity);

                let ask = Decimal::new(rng.gen_range(0..500_000), 2);
                let bid = Decimal::new(rng.gen_range(0..500_000), 2);
                gateway.set_book(&plan.buy_instrument, None, Some(ask)).await;
                gateway.set_book(&plan.sell_instrument, Some(bid), None).await;

                let net_cost = (ask - bid) * plan.amount;
                match b.build(&gateway, plan).await {
                    Ok(executed) => {
                        assert!(executed.net_cost.abs() <= budget);
                        assert_eq!(gateway.submitted_orders().await.len(), 2);
                    }
                    Err(SpreadError::BudgetExceeded { .. }) => {
                        assert!(net_cost.abs() > budget);
                        assert!(gateway.submitted_orders().await.is_empty());
                    }
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            }
        });
    }
}
