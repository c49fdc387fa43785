// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Beacon deviation arithmetic.
//!
//! Deviations are measured on a `10^18` fixed-point scale (so `10^18` is
//! 100%) and thresholds are expressed in basis points of `10^14` each.
//! Percentages support two decimal places: a `deviationPercentage` of
//! `0.25` becomes `25` basis points. No floating point is involved in the
//! comparison itself.

use ethers::types::{I256, U256};

/// One basis point on the deviation scale: `10^14`.
pub fn basis_point() -> U256 {
    U256::exp10(14)
}

/// Returns whether `value` is usable as a deviation percentage: finite,
/// positive, and no finer than two decimal places would represent.
pub fn is_valid_deviation_percentage(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Computes the deviation of `api` from `on_chain` on the `10^18` scale.
///
/// A zero on-chain value is treated as `1`, matching the on-chain guard, so
/// any nonzero fetched value registers as a (very large) deviation.
pub fn compute_deviation(on_chain: I256, api: I256) -> U256 {
    let delta = match api.checked_sub(on_chain) {
        Some(delta) => delta.unsigned_abs(),
        // only reachable at the extremes of the int256 range
        None => return U256::MAX,
    };
    if delta.is_zero() {
        return U256::zero();
    }
    let denominator = if on_chain.is_zero() {
        U256::one()
    } else {
        on_chain.unsigned_abs()
    };
    delta.saturating_mul(U256::exp10(18)) / denominator
}

/// Converts a two-decimal percentage into a basis point threshold on the
/// deviation scale.
pub fn deviation_threshold(deviation_percentage: f64) -> U256 {
    let basis_points = (deviation_percentage * 100.0).round();
    basis_point() * U256::from(basis_points as u64)
}

/// The RRP update condition: update only when the fetched value deviates
/// from the beacon by strictly more than the configured percentage.
pub fn update_condition(
    on_chain: I256,
    api: I256,
    deviation_percentage: f64,
) -> bool {
    compute_deviation(on_chain, api) > deviation_threshold(deviation_percentage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_never_update() {
        let value = I256::from(723_392_020i64);
        assert!(!update_condition(value, value, 0.01));
        assert_eq!(compute_deviation(value, value), U256::zero());
    }

    #[test]
    fn one_percent_deviation_is_ten_to_the_sixteen() {
        let deviation =
            compute_deviation(I256::from(100i64), I256::from(101i64));
        assert_eq!(deviation, U256::exp10(16));
    }

    #[test]
    fn threshold_comparison_is_strict() {
        // exactly 1% deviation against a 1% threshold: no update
        assert!(!update_condition(I256::from(100i64), I256::from(101i64), 1.0));
        // but a 0.99% threshold lets it through
        assert!(update_condition(I256::from(100i64), I256::from(101i64), 0.99));
    }

    #[test]
    fn two_decimal_thresholds() {
        assert_eq!(
            deviation_threshold(0.25),
            basis_point() * U256::from(25u64)
        );
        assert_eq!(
            deviation_threshold(1.0),
            basis_point() * U256::from(100u64)
        );
    }

    #[test]
    fn zero_beacon_registers_any_change_as_huge() {
        assert!(update_condition(I256::zero(), I256::from(1i64), 100.0));
    }

    #[test]
    fn negative_values_use_absolute_deviation() {
        // -100 -> -90 is a 10% move
        let deviation =
            compute_deviation(I256::from(-100i64), I256::from(-90i64));
        assert_eq!(deviation, U256::exp10(17));
        assert!(update_condition(I256::from(-100i64), I256::from(-90i64), 5.0));
        assert!(!update_condition(
            I256::from(-100i64),
            I256::from(-90i64),
            15.0
        ));
    }

    #[test]
    fn percentage_validation() {
        assert!(is_valid_deviation_percentage(0.01));
        assert!(is_valid_deviation_percentage(10.0));
        assert!(!is_valid_deviation_percentage(0.0));
        assert!(!is_valid_deviation_percentage(-1.0));
        assert!(!is_valid_deviation_percentage(f64::NAN));
        assert!(!is_valid_deviation_percentage(f64::INFINITY));
    }
}
