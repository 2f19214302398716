use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept before taking the ceiling.
///
/// Division of non-terminating quotients (100 / 3) is cut at the 28th
/// significant digit, which can leave `33.33…34` where `33.33…3` was meant.
/// Prices carry a handful of fractional digits and quantities are small,
/// so any real fraction sits far above 10⁻¹² while the division residue
/// sits far below it.
pub const SETTLEMENT_GUARD_SCALE: u32 = 12;

/// Round up to a whole currency unit.
pub fn round_up(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(SETTLEMENT_GUARD_SCALE, RoundingStrategy::MidpointNearestEven)
        .ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn any_real_fraction_rounds_up() {
        assert_eq!(round_up(dec!(33.0001)), dec!(34));
        assert_eq!(round_up(dec!(0.01)), dec!(1));
    }

    #[test]
    fn whole_amounts_stay_put() {
        assert_eq!(round_up(dec!(605)), dec!(605));
        assert_eq!(round_up(dec!(605.000)), dec!(605));
        assert_eq!(round_up(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn division_residue_does_not_add_a_unit() {
        let third = dec!(200) / dec!(3);
        assert_eq!(round_up(third * dec!(3)), dec!(200));
        assert_eq!(round_up(dec!(100) / dec!(3)), dec!(34));
    }
}
