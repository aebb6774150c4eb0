//! Fixed-point interest arithmetic.
//!
//! The annual rate in basis points is the only configured figure; the monthly
//! rate is always `annual / 12`, so a full year of monthly accrual equals the
//! annual interest exactly.

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

const BPS_DENOMINATOR: i128 = 10_000;
const MONTHS_PER_YEAR: i128 = 12;
/// Loans are capped at 80 % of total deposits.
const ELIGIBILITY_PERCENT: i128 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRate {
    annual_bps: i64,
}

impl Default for InterestRate {
    /// 12 % per annum.
    fn default() -> Self {
        Self { annual_bps: 1_200 }
    }
}

impl InterestRate {
    pub fn from_annual_bps(annual_bps: i64) -> ResultEngine<Self> {
        if annual_bps < 0 {
            return Err(EngineError::Validation(
                "annual interest rate must be >= 0".to_string(),
            ));
        }
        Ok(Self { annual_bps })
    }

    pub fn annual_bps(self) -> i64 {
        self.annual_bps
    }

    /// Interest for a full year on `total_deposit`.
    pub fn full_interest(self, total_deposit: i64) -> i64 {
        round_div(
            i128::from(total_deposit) * i128::from(self.annual_bps),
            BPS_DENOMINATOR,
        )
    }

    /// Interest accrued on `total_deposit` after `months` whole months.
    pub fn current_interest(self, total_deposit: i64, months: i32) -> i64 {
        round_div(
            i128::from(total_deposit) * i128::from(self.annual_bps) * i128::from(months),
            BPS_DENOMINATOR * MONTHS_PER_YEAR,
        )
    }
}

/// 80 % of `total_deposits`, rounded down to the paisa.
pub fn eligibility_cap(total_deposits: i64) -> i64 {
    let cap = i128::from(total_deposits.max(0)) * ELIGIBILITY_PERCENT / 100;
    // cap <= total_deposits, so the conversion cannot fail.
    i64::try_from(cap).unwrap_or(i64::MAX)
}

/// Division rounding half away from zero, saturated to `i64`.
fn round_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn twelve_percent_on_ten_thousand() {
        let rate = InterestRate::default();
        // 10_000.00 rupees in paise.
        let total = 1_000_000;
        assert_eq!(rate.full_interest(total), 120_000);
        assert_eq!(rate.current_interest(total, 6), 60_000);
        assert_eq!(rate.current_interest(total, 0), 0);
    }

    #[test]
    fn rounds_half_up_to_the_paisa() {
        let rate = InterestRate::from_annual_bps(1_000).unwrap();
        // 1 paisa * 10 % * 1/12 rounds to 0, 6 paise * 10 % * 10/12 = 0.5 rounds to 1.
        assert_eq!(rate.current_interest(1, 1), 0);
        assert_eq!(rate.current_interest(6, 10), 1);
    }

    #[test]
    fn negative_rate_is_rejected() {
        assert!(matches!(
            InterestRate::from_annual_bps(-1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn cap_is_eighty_percent() {
        assert_eq!(eligibility_cap(300_000), 240_000);
        assert_eq!(eligibility_cap(0), 0);
        assert_eq!(eligibility_cap(1), 0);
        assert_eq!(eligibility_cap(-500), 0);
    }

    #[test]
    fn cap_does_not_overflow_on_large_deposits() {
        assert_eq!(eligibility_cap(i64::MAX / 50), 147_573_952_589_676_412);
        assert_eq!(eligibility_cap(i64::MAX), 7_378_697_629_483_820_645);
    }

    proptest! {
        #[test]
        fn twelve_months_equal_full_year(total in 0i64..1_000_000_000_000, bps in 0i64..10_000) {
            let rate = InterestRate::from_annual_bps(bps).unwrap();
            prop_assert_eq!(rate.current_interest(total, 12), rate.full_interest(total));
        }

        #[test]
        fn accrual_is_monotonic_in_months(total in 0i64..1_000_000_000, months in 0i32..240) {
            let rate = InterestRate::default();
            prop_assert!(rate.current_interest(total, months) <= rate.current_interest(total, months + 1));
        }

        #[test]
        fn cap_never_exceeds_deposits(total in 0i64..=i64::MAX) {
            let cap = eligibility_cap(total);
            prop_assert!(cap <= total);
            prop_assert!(cap >= 0);
        }
    }
}
