use crate::constants::LIQUIDATABLE_HF;
use crate::errors::Result;
use crate::oracle::PoolOracle;

use super::{Pool, Positions};

/// USD-denominated estimate of a set of positions. Effective values carry
/// the collateral and liability factors; raw values do not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionEstimate {
    /// The effective collateral balance
    pub collateral_base: f64,
    /// The raw collateral balance
    pub collateral_raw: f64,
    /// The effective liability balance
    pub liability_base: f64,
    /// The raw liability balance
    pub liability_raw: f64,
}

impl PositionEstimate {
    /// Estimate the value of a set of positions against the oracle snapshot.
    ///
    /// ### Errors
    /// If a position's reserve is missing from the pool or has no oracle price
    pub fn from_positions(
        pool: &Pool,
        oracle: &PoolOracle,
        positions: &Positions,
    ) -> Result<Self> {
        let mut estimate = PositionEstimate::default();
        for (index, b_token_balance) in positions.collateral.iter() {
            let reserve = pool.reserve_by_index(*index)?;
            let price = oracle.price(&reserve.asset)?;
            let raw = reserve.to_float(reserve.to_asset_from_b_token(*b_token_balance));
            let effective =
                reserve.to_float(reserve.to_effective_asset_from_b_token(*b_token_balance));
            estimate.collateral_raw += raw * price;
            estimate.collateral_base += effective * price;
        }
        for (index, d_token_balance) in positions.liabilities.iter() {
            let reserve = pool.reserve_by_index(*index)?;
            let price = oracle.price(&reserve.asset)?;
            let raw = reserve.to_float(reserve.to_asset_from_d_token(*d_token_balance));
            let effective =
                reserve.to_float(reserve.to_effective_asset_from_d_token(*d_token_balance));
            estimate.liability_raw += raw * price;
            estimate.liability_base += effective * price;
        }
        Ok(estimate)
    }

    /// Return the health factor as a ratio
    pub fn as_health_factor(&self) -> f64 {
        if self.liability_base <= 0.0 {
            return f64::MAX;
        }
        self.collateral_base / self.liability_base
    }

    /// Whether the positions can be liquidated
    pub fn is_liquidatable(&self) -> bool {
        self.liability_base > 0.0 && self.as_health_factor() < LIQUIDATABLE_HF
    }

    /// Whether the positions carry liabilities with no collateral backing
    pub fn is_bad_debt(&self) -> bool {
        self.collateral_base == 0.0 && self.liability_base > 0.0
    }
}
