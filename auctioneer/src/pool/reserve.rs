use cast::i128;
use soroban_fixed_point_math::FixedPoint;

use crate::constants::{SCALAR_7, SCALAR_9};

/// A read-only snapshot of a pool reserve, refreshed from the chain each
/// event. Rates are estimates as of the snapshot ledger; the chain accrues
/// them forward on every touch.
#[derive(Debug, Clone)]
pub struct Reserve {
    pub asset: String,    // the underlying asset address
    pub index: u32,       // the reserve index in the pool
    pub l_factor: u32,    // the liability factor for the reserve (7 decimals)
    pub c_factor: u32,    // the collateral factor for the reserve (7 decimals)
    pub decimals: u32,    // decimals of the underlying asset
    pub scalar: i128,     // scalar used for balances
    pub d_rate: i128,     // the conversion rate from dToken to underlying (9 decimals)
    pub b_rate: i128,     // the conversion rate from bToken to underlying (9 decimals)
}

impl Reserve {
    /********** Conversion Functions **********/

    /// Convert d_tokens to the corresponding asset value
    pub fn to_asset_from_d_token(&self, d_tokens: i128) -> i128 {
        d_tokens.fixed_mul_ceil(self.d_rate, SCALAR_9).unwrap()
    }

    /// Convert b_tokens to the corresponding asset value
    pub fn to_asset_from_b_token(&self, b_tokens: i128) -> i128 {
        b_tokens.fixed_mul_floor(self.b_rate, SCALAR_9).unwrap()
    }

    /// Convert d_tokens to their corresponding effective asset value. This
    /// takes into account the liability factor.
    pub fn to_effective_asset_from_d_token(&self, d_tokens: i128) -> i128 {
        let assets = self.to_asset_from_d_token(d_tokens);
        assets
            .fixed_div_ceil(i128(self.l_factor), SCALAR_7)
            .unwrap()
    }

    /// Convert b_tokens to the corresponding effective asset value. This
    /// takes into account the collateral factor.
    pub fn to_effective_asset_from_b_token(&self, b_tokens: i128) -> i128 {
        let assets = self.to_asset_from_b_token(b_tokens);
        assets
            .fixed_mul_floor(i128(self.c_factor), SCALAR_7)
            .unwrap()
    }

    /// Convert asset tokens to the corresponding d token value - rounding up
    pub fn to_d_token_up(&self, amount: i128) -> i128 {
        amount.fixed_div_ceil(self.d_rate, SCALAR_9).unwrap()
    }

    /// Convert asset tokens to the corresponding d token value - rounding down
    pub fn to_d_token_down(&self, amount: i128) -> i128 {
        amount.fixed_div_floor(self.d_rate, SCALAR_9).unwrap()
    }

    /// Convert asset tokens to the corresponding b token value - round up
    pub fn to_b_token_up(&self, amount: i128) -> i128 {
        amount.fixed_div_ceil(self.b_rate, SCALAR_9).unwrap()
    }

    /// Convert asset tokens to the corresponding b token value - round down
    pub fn to_b_token_down(&self, amount: i128) -> i128 {
        amount.fixed_div_floor(self.b_rate, SCALAR_9).unwrap()
    }

    /********** Decision Math **********/

    /// A token amount in the reserve's decimals as a float
    pub fn to_float(&self, amount: i128) -> f64 {
        amount as f64 / self.scalar as f64
    }

    /// A float amount of underlying into the reserve's decimals, rounding up
    pub fn to_fixed_ceil(&self, amount: f64) -> i128 {
        (amount * self.scalar as f64).ceil() as i128
    }

    /// The collateral factor as a ratio
    pub fn collateral_factor(&self) -> f64 {
        self.c_factor as f64 / SCALAR_7 as f64
    }

    /// The liability factor as a ratio. Effective liabilities divide by this,
    /// so a factor below one scales debt up.
    pub fn liability_factor(&self) -> f64 {
        self.l_factor as f64 / SCALAR_7 as f64
    }
}
