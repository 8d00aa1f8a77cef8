use serde::Serialize;

use super::error::ParameterError;

pub const HIGH_CAPITAL_USAGE: f64 = 0.7;
pub const MAX_BOND_YEARS: u32 = 1_000;

pub fn capm_expected_return(risk_free_rate: f64, beta: f64, market_return: f64) -> f64 {
    risk_free_rate + beta * (market_return - risk_free_rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BondValuation {
    pub annual_coupon: f64,
    pub coupons_present_value: f64,
    pub face_present_value: f64,
    pub price: f64,
}

pub fn bond_present_value(
    face_value: f64,
    coupon_rate: f64,
    years_to_maturity: u32,
    market_rate: f64,
) -> Result<BondValuation, ParameterError> {
    if !face_value.is_finite() || face_value <= 0.0 {
        return Err(ParameterError::invalid("face_value", "> 0", face_value));
    }
    if !coupon_rate.is_finite() || coupon_rate < 0.0 {
        return Err(ParameterError::invalid("coupon_rate", ">= 0", coupon_rate));
    }
    if !market_rate.is_finite() || market_rate <= -1.0 {
        return Err(ParameterError::invalid("market_rate", "> -1", market_rate));
    }
    if years_to_maturity > MAX_BOND_YEARS {
        return Err(ParameterError::invalid(
            "years_to_maturity",
            "<= 1000",
            years_to_maturity as f64,
        ));
    }

    let annual_coupon = face_value * coupon_rate;
    let discount = 1.0 + market_rate;
    let mut discount_factor = 1.0;
    let mut coupons_present_value = 0.0;
    for _ in 0..years_to_maturity {
        discount_factor /= discount;
        coupons_present_value += annual_coupon * discount_factor;
    }
    let face_present_value = face_value * discount_factor;

    Ok(BondValuation {
        annual_coupon,
        coupons_present_value,
        face_present_value,
        price: coupons_present_value + face_present_value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuturesPosition {
    pub entry_price: f64,
    pub contracts: u32,
    pub contract_size: f64,
    pub margin_rate: f64,
    pub total_capital: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesMarginResult {
    pub margin: f64,
    pub leverage: f64,
    pub capital_usage: f64,
    pub liquidation_price: f64,
    pub high_capital_usage: bool,
}

pub fn futures_margin(position: FuturesPosition) -> Result<FuturesMarginResult, ParameterError> {
    let FuturesPosition {
        entry_price,
        contracts,
        contract_size,
        margin_rate,
        total_capital,
    } = position;

    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(ParameterError::invalid("entry_price", "> 0", entry_price));
    }
    if contracts == 0 {
        return Err(ParameterError::invalid("contracts", ">= 1", 0.0));
    }
    if !contract_size.is_finite() || contract_size <= 0.0 {
        return Err(ParameterError::invalid("contract_size", "> 0", contract_size));
    }
    if !(margin_rate > 0.0 && margin_rate <= 1.0) {
        return Err(ParameterError::invalid(
            "margin_rate",
            "in (0, 1]",
            margin_rate,
        ));
    }
    if !total_capital.is_finite() || total_capital <= 0.0 {
        return Err(ParameterError::invalid(
            "total_capital",
            "> 0",
            total_capital,
        ));
    }

    let units = contracts as f64 * contract_size;
    let margin = entry_price * units * margin_rate;
    let capital_usage = margin / total_capital;

    Ok(FuturesMarginResult {
        margin,
        leverage: 1.0 / margin_rate,
        capital_usage,
        liquidation_price: (margin - total_capital) / units + entry_price,
        high_capital_usage: capital_usage > HIGH_CAPITAL_USAGE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_position() -> FuturesPosition {
        FuturesPosition {
            entry_price: 4_000.0,
            contracts: 2,
            contract_size: 10.0,
            margin_rate: 0.1,
            total_capital: 20_000.0,
        }
    }

    #[test]
    fn capm_adds_beta_scaled_market_premium() {
        assert_approx(capm_expected_return(0.03, 1.2, 0.08), 0.09);
        assert_approx(capm_expected_return(0.03, 0.0, 0.08), 0.03);
    }

    #[test]
    fn par_bond_prices_at_face() {
        let bond = bond_present_value(1_000.0, 0.05, 10, 0.05).expect("valid bond");
        assert_approx(bond.annual_coupon, 50.0);
        assert!((bond.price - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn bond_matches_hand_calculation() {
        let bond = bond_present_value(100.0, 0.10, 2, 0.0).expect("valid bond");
        assert_approx(bond.coupons_present_value, 20.0);
        assert_approx(bond.face_present_value, 100.0);
        assert_approx(bond.price, 120.0);

        let bond = bond_present_value(100.0, 0.0, 1, 0.25).expect("valid bond");
        assert_approx(bond.price, 80.0);
    }

    #[test]
    fn zero_year_bond_is_worth_face() {
        let bond = bond_present_value(1_000.0, 0.05, 0, 0.07).expect("valid bond");
        assert_approx(bond.coupons_present_value, 0.0);
        assert_approx(bond.price, 1_000.0);
    }

    #[test]
    fn bond_rejects_invalid_rates() {
        let err = bond_present_value(1_000.0, 0.05, 5, -1.0).expect_err("must reject");
        assert_eq!(err.parameter_name(), "market_rate");
        let err = bond_present_value(0.0, 0.05, 5, 0.05).expect_err("must reject");
        assert_eq!(err.parameter_name(), "face_value");
    }

    #[test]
    fn bond_rejects_maturity_beyond_limit() {
        let err = bond_present_value(1_000.0, 0.05, 2_147_483_648, 0.05).expect_err("must reject");
        assert_eq!(err.parameter_name(), "years_to_maturity");
        let err =
            bond_present_value(1_000.0, 0.05, MAX_BOND_YEARS + 1, 0.05).expect_err("must reject");
        assert_eq!(err.parameter_name(), "years_to_maturity");
    }

    #[test]
    fn longest_par_bond_stays_finite_at_face() {
        let bond = bond_present_value(1_000.0, 0.05, MAX_BOND_YEARS, 0.05).expect("valid bond");
        assert!(bond.price.is_finite());
        assert!((bond.price - 1_000.0).abs() < 1e-6);
        assert!(bond.face_present_value > 0.0);
    }

    #[test]
    fn futures_margin_matches_hand_calculation() {
        let result = futures_margin(sample_position()).expect("valid position");
        assert_approx(result.margin, 8_000.0);
        assert_approx(result.leverage, 10.0);
        assert_approx(result.capital_usage, 0.4);
        assert_approx(result.liquidation_price, 3_400.0);
        assert!(!result.high_capital_usage);
    }

    #[test]
    fn futures_margin_flags_high_capital_usage() {
        let mut position = sample_position();
        position.total_capital = 10_000.0;
        let result = futures_margin(position).expect("valid position");
        assert_approx(result.capital_usage, 0.8);
        assert!(result.high_capital_usage);
    }

    #[test]
    fn futures_margin_rejects_out_of_range_margin_rate() {
        for rate in [0.0, -0.1, 1.5, f64::NAN] {
            let mut position = sample_position();
            position.margin_rate = rate;
            let err = futures_margin(position).expect_err("must reject");
            assert_eq!(err.parameter_name(), "margin_rate");
        }
    }

    #[test]
    fn futures_margin_rejects_zero_contracts() {
        let mut position = sample_position();
        position.contracts = 0;
        let err = futures_margin(position).expect_err("must reject");
        assert_eq!(err.parameter_name(), "contracts");
    }
}
