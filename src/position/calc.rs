use crate::models::{PositionProjection, RiskLevel};

/// Times the contract re-deposits borrowed value as new collateral.
pub const COLLATERAL_LOOPS: usize = 3;
/// Times DAI is drawn across the loop.
pub const DEBT_LOOPS: usize = 4;
/// Ratios strictly above this are flagged as `RiskLevel::Danger`.
pub const DANGER_RATIO_PERCENT: f64 = 50.0;
/// Collateral must stay worth this multiple of the debt.
pub const LIQUIDATION_THRESHOLD: f64 = 2.0;
pub const LOOP_FACTOR: f64 = 3.0;

/// Project the outcome of looping `eth_amount` at `ratio_percent`.
///
/// # Arguments
/// * `eth_amount` - ETH locked by the user
/// * `ratio_percent` - Rehypothecation rate, e.g. 50.0 for 50%
/// * `eth_price` - DAI cost of 1 ETH at the time of projection
///
/// # Returns
/// A fresh `PositionProjection`. Degenerate divisions yield 0 instead of
/// NaN or infinity.
pub fn project(eth_amount: f64, ratio_percent: f64, eth_price: f64) -> PositionProjection {
    let ratio = ratio_percent / 100.0;

    // collateral = eth * (1 + r + r^2 + r^3)
    let mut current = eth_amount;
    let mut collateral = eth_amount;
    for _ in 0..COLLATERAL_LOOPS {
        current *= ratio;
        collateral += current;
    }

    // debt = eth * price * (r + r^2 + r^3 + r^4), priced at the initial rate
    let mut accumulator = eth_price;
    let mut debt = 0.0;
    for _ in 0..DEBT_LOOPS {
        accumulator *= ratio;
        debt += accumulator;
    }
    debt *= eth_amount;

    let expected_return = debt - (collateral - eth_amount) * eth_price;

    PositionProjection {
        total_collateral_eth: collateral,
        total_debt_dai: debt,
        liquidation_price_dai: liquidation_price(debt, collateral),
        expected_return_dai: expected_return,
        collateralization_rate_percent: collateralization_rate(ratio),
        risk_level: risk_level(ratio_percent),
    }
}

/// ETH price at which collateral covers the debt only `LIQUIDATION_THRESHOLD` times.
pub fn liquidation_price(debt: f64, collateral: f64) -> f64 {
    if collateral == 0.0 {
        return 0.0;
    }
    let price = (debt / collateral / LIQUIDATION_THRESHOLD) * LOOP_FACTOR;
    if price.is_finite() { price } else { 0.0 }
}

/// `round(100 / ratio)`, or 0 when the ratio is not positive.
pub fn collateralization_rate(ratio: f64) -> u32 {
    if ratio.is_nan() || ratio <= 0.0 {
        return 0;
    }
    let rate = (100.0 / ratio).round();
    if rate.is_finite() && rate <= u32::MAX as f64 {
        rate as u32
    } else {
        0
    }
}

pub fn risk_level(ratio_percent: f64) -> RiskLevel {
    if ratio_percent > DANGER_RATIO_PERCENT {
        RiskLevel::Danger
    } else {
        RiskLevel::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPS * b.abs().max(1.0)
    }

    #[test]
    fn half_ratio_scenario() {
        let res = project(0.1, 50.0, 150.0);

        println!("{:?}", res);
        assert!(approx_eq(res.total_collateral_eth, 0.1875));
        assert!(approx_eq(res.total_debt_dai, 14.0625));
        assert!(approx_eq(res.expected_return_dai, 0.9375));
        assert!(approx_eq(res.liquidation_price_dai, 112.5));
        assert_eq!(res.collateralization_rate_percent, 200);
        assert_eq!(res.risk_level, RiskLevel::Safe);
    }

    #[test]
    fn sixty_percent_is_danger() {
        let res = project(0.1, 60.0, 150.0);

        // r = 0.6: 1 + .6 + .36 + .216 = 2.176
        assert!(approx_eq(res.total_collateral_eth, 0.2176));
        // .6 + .36 + .216 + .1296 = 1.3056
        assert!(approx_eq(res.total_debt_dai, 0.1 * 150.0 * 1.3056));
        assert_eq!(res.collateralization_rate_percent, 167);
        assert_eq!(res.risk_level, RiskLevel::Danger);
    }

    #[test]
    fn closed_forms_hold_across_inputs() {
        for &eth in &[0.01, 0.05, 0.1, 1.0, 12.5] {
            for &pct in &[1.0, 10.0, 25.0, 33.0, 50.0, 60.0, 99.0] {
                for &price in &[1.0, 150.0, 2_500.0] {
                    let r: f64 = pct / 100.0;
                    let res = project(eth, pct, price);

                    let collateral = eth * (1.0 + r + r.powi(2) + r.powi(3));
                    let debt = eth * price * (r + r.powi(2) + r.powi(3) + r.powi(4));
                    assert!(approx_eq(res.total_collateral_eth, collateral));
                    assert!(approx_eq(res.total_debt_dai, debt));
                    assert!(res.total_collateral_eth >= eth);
                }
            }
        }
    }

    #[test]
    fn risk_boundary_is_exclusive() {
        assert_eq!(risk_level(50.0), RiskLevel::Safe);
        assert_eq!(risk_level(50.01), RiskLevel::Danger);
        assert_eq!(risk_level(10.0), RiskLevel::Safe);
    }

    #[test]
    fn zero_collateral_has_zero_liquidation_price() {
        let res = project(0.0, 50.0, 150.0);
        assert_eq!(res.total_collateral_eth, 0.0);
        assert_eq!(res.liquidation_price_dai, 0.0);
        assert_eq!(liquidation_price(10.0, 0.0), 0.0);
    }

    #[test]
    fn zero_ratio_does_not_produce_nan() {
        let res = project(0.1, 0.0, 150.0);
        assert_eq!(res.collateralization_rate_percent, 0);
        assert!(approx_eq(res.total_collateral_eth, 0.1));
        assert_eq!(res.total_debt_dai, 0.0);
        assert_eq!(res.liquidation_price_dai, 0.0);
        assert!(!res.expected_return_dai.is_nan());
    }
}
