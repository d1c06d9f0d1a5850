use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tiered governance fee schedule: higher-risk evaluations cost more.
/// Ordered highest-threshold-first; the first satisfied tier wins.
const FEE_TIERS: &[(u8, Decimal)] = &[(90, dec!(0.025)), (70, dec!(0.010)), (40, dec!(0.005))];
const STANDARD_FEE: Decimal = dec!(0.001);

/// Returns the governance fee for a given risk score.
pub fn compute_fee(risk_score: u8) -> Decimal {
    for (threshold, fee) in FEE_TIERS {
        if risk_score >= *threshold {
            return *fee;
        }
    }
    STANDARD_FEE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_risk_pays_the_top_tier() {
        assert_eq!(compute_fee(95), dec!(0.025));
        assert_eq!(compute_fee(90), dec!(0.025));
    }

    #[test]
    fn standard_risk_pays_the_floor_fee() {
        assert_eq!(compute_fee(0), dec!(0.001));
        assert_eq!(compute_fee(39), dec!(0.001));
    }

    #[test]
    fn tier_boundaries_are_inclusive_on_the_low_end() {
        assert_eq!(compute_fee(70), dec!(0.010));
        assert_eq!(compute_fee(40), dec!(0.005));
    }
}
