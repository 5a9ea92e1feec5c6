//! Decimal helpers for strike and price arithmetic.

use rust_decimal::Decimal;

/// Round a value to the nearest multiple of `tick`.
///
/// Returns the value unchanged when `tick` is zero or negative.
pub fn round_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return value;
    }
    (value / tick).round() * tick
}

/// Divide, returning `None` when the divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(dec!(68250), dec!(250)), dec!(68250));
        assert_eq!(round_to_tick(dec!(68200), dec!(250)), dec!(68250));
        assert_eq!(round_to_tick(dec!(68100), dec!(250)), dec!(68000));
        assert_eq!(round_to_tick(dec!(1787.5), dec!(25)), dec!(1775));
    }

    #[test]
    fn test_round_to_tick_degenerate_tick() {
        assert_eq!(round_to_tick(dec!(123.4), Decimal::ZERO), dec!(123.4));
        assert_eq!(round_to_tick(dec!(123.4), dec!(-1)), dec!(123.4));
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), Some(dec!(2.5)));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), None);
    }
}
