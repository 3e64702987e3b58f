use std::collections::HashMap;

use crate::constants::SCALAR_7;
use crate::errors::{AuctioneerError, Result};
use crate::oracle::PoolOracle;
use crate::pool::Pool;

use super::auction::{AuctionData, AuctionType};

/// A valuation of an auction snapshot in the oracle's quote currency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionValue {
    /// Effective collateral the fill adds to the filler's positions
    pub effective_collateral: f64,
    /// Effective liabilities the fill adds to the filler's positions
    pub effective_liabilities: f64,
    /// Effective liabilities the filler could repay out of its wallet
    pub repayable_liabilities: f64,
    /// Value of the full lot
    pub lot_value: f64,
    /// Value of the full bid
    pub bid_value: f64,
}

/// Everything needed to price an auction snapshot.
pub struct ValuationContext<'a> {
    pub pool: &'a Pool,
    pub oracle: &'a PoolOracle,
    /// The backstop LP token address
    pub backstop_token: &'a str,
    /// Quote value of one whole backstop LP token (see `backstop` module)
    pub lp_token_price: f64,
    /// Fresher externally-sourced prices, preferred over the oracle when
    /// valuing what the filler pays or receives
    pub price_overrides: &'a HashMap<String, f64>,
}

impl ValuationContext<'_> {
    /// The exchange-preferred price used for lot and bid value
    fn market_price(&self, asset: &str) -> Result<f64> {
        if let Some(price) = self.price_overrides.get(asset) {
            return Ok(*price);
        }
        self.oracle.price(asset)
    }
}

/// Value an auction snapshot against the filler's wallet.
///
/// ### Errors
/// If a lot or bid asset is missing from the pool's reserves where reserves
/// are expected, if an oracle price is missing, or if an interest or bad debt
/// auction carries an asset other than the backstop LP token on its backstop
/// side.
pub fn valuate(
    auction_type: AuctionType,
    auction: &AuctionData,
    ctx: &ValuationContext,
    filler_balances: &HashMap<String, i128>,
) -> Result<AuctionValue> {
    let mut value = AuctionValue::default();
    match auction_type {
        AuctionType::Liquidation => {
            value_collateral_lot(auction, ctx, &mut value)?;
            value_liability_bid(auction, ctx, filler_balances, &mut value)?;
        }
        AuctionType::Interest => {
            for (asset, amount) in auction.lot.iter() {
                let reserve = ctx.pool.reserve(asset)?;
                value.lot_value += reserve.to_float(amount) * ctx.market_price(asset)?;
            }
            for (asset, amount) in auction.bid.iter() {
                if asset != ctx.backstop_token {
                    return Err(AuctioneerError::UnexpectedAsset(asset.clone()));
                }
                value.bid_value += amount as f64 / SCALAR_7 as f64 * ctx.lp_token_price;
            }
        }
        AuctionType::BadDebt => {
            for (asset, amount) in auction.lot.iter() {
                if asset != ctx.backstop_token {
                    return Err(AuctioneerError::UnexpectedAsset(asset.clone()));
                }
                value.lot_value += amount as f64 / SCALAR_7 as f64 * ctx.lp_token_price;
            }
            value_liability_bid(auction, ctx, filler_balances, &mut value)?;
        }
    }
    Ok(value)
}

/// Value a bToken lot against both the oracle (effective side) and the
/// freshest market price (exchange side).
fn value_collateral_lot(
    auction: &AuctionData,
    ctx: &ValuationContext,
    value: &mut AuctionValue,
) -> Result<()> {
    for (asset, b_tokens) in auction.lot.iter() {
        let reserve = ctx.pool.reserve(asset)?;
        let oracle_price = ctx.oracle.price(asset)?;
        let underlying = reserve.to_float(reserve.to_asset_from_b_token(b_tokens));
        let effective = reserve.to_float(reserve.to_effective_asset_from_b_token(b_tokens));
        value.effective_collateral += effective * oracle_price;
        value.lot_value += underlying * ctx.market_price(asset)?;
    }
    Ok(())
}

/// Value a dToken bid, tracking what portion the filler's wallet could repay
/// immediately after the fill.
fn value_liability_bid(
    auction: &AuctionData,
    ctx: &ValuationContext,
    filler_balances: &HashMap<String, i128>,
    value: &mut AuctionValue,
) -> Result<()> {
    for (asset, d_tokens) in auction.bid.iter() {
        let reserve = ctx.pool.reserve(asset)?;
        let oracle_price = ctx.oracle.price(asset)?;
        let underlying = reserve.to_float(reserve.to_asset_from_d_token(d_tokens));
        let effective = reserve.to_float(reserve.to_effective_asset_from_d_token(d_tokens));
        value.effective_liabilities += effective * oracle_price;
        value.bid_value += underlying * ctx.market_price(asset)?;

        let balance = filler_balances.get(asset).copied().unwrap_or(0);
        if balance > 0 {
            let repayable = reserve.to_float(balance).min(underlying);
            value.repayable_liabilities +=
                repayable * oracle_price / reserve.liability_factor();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Reserve;

    fn fixture() -> (Pool, PoolOracle) {
        let assets = [
            // (asset, index, c_factor, l_factor, price)
            ("CXLM", 0u32, 0_9000000u32, 0_9000000u32, 0_0990000i128),
            ("CUSDC", 1, 0_9500000, 0_9500000, 0_9997000),
            ("CEURC", 2, 0_9500000, 0_9500000, 1_0928000),
        ];
        let mut reserves = HashMap::new();
        let mut prices = HashMap::new();
        let mut reserve_list = vec![];
        for (asset, index, c_factor, l_factor, price) in assets {
            reserves.insert(
                asset.to_string(),
                Reserve {
                    asset: asset.to_string(),
                    index,
                    l_factor,
                    c_factor,
                    decimals: 7,
                    scalar: SCALAR_7,
                    b_rate: 1_000_000_000,
                    d_rate: 1_000_000_000,
                },
            );
            prices.insert(asset.to_string(), price);
            reserve_list.push(asset.to_string());
        }
        let pool = Pool {
            address: "CPOOL".to_string(),
            backstop: "CBACKSTOP".to_string(),
            oracle: "CORACLE".to_string(),
            max_positions: 6,
            reserve_list,
            reserves,
        };
        (pool, PoolOracle::new(7, prices))
    }

    #[test]
    fn test_valuate_liquidation() {
        let (pool, oracle) = fixture();
        let overrides = HashMap::new();
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CUSDC", 10_0000000);
        auction.bid.set("CXLM", 100_0000000);
        let mut balances = HashMap::new();
        balances.insert("CXLM".to_string(), 4_0000000i128);

        let value = valuate(AuctionType::Liquidation, &auction, &ctx, &balances).unwrap();

        assert!((value.lot_value - 10.0 * 0.9997).abs() < 1e-9);
        assert!((value.effective_collateral - 10.0 * 0.95 * 0.9997).abs() < 1e-9);
        assert!((value.bid_value - 100.0 * 0.099).abs() < 1e-9);
        assert!((value.effective_liabilities - 100.0 * 0.099 / 0.9).abs() < 1e-9);
        // wallet covers 4 of the 100 XLM owed
        assert!((value.repayable_liabilities - 4.0 * 0.099 / 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_valuate_prefers_price_override() {
        let (pool, oracle) = fixture();
        let mut overrides = HashMap::new();
        overrides.insert("CUSDC".to_string(), 1.01);
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CUSDC", 10_0000000);

        let value = valuate(AuctionType::Liquidation, &auction, &ctx, &HashMap::new()).unwrap();

        // the exchange price moves the lot value but not the effective side
        assert!((value.lot_value - 10.0 * 1.01).abs() < 1e-9);
        assert!((value.effective_collateral - 10.0 * 0.95 * 0.9997).abs() < 1e-9);
    }

    #[test]
    fn test_valuate_interest() {
        let (pool, oracle) = fixture();
        let overrides = HashMap::new();
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5011,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CXLM", 120_0000000);
        auction.lot.set("CUSDC", 210_0000000);
        auction.bid.set("CLPTOKEN", 728_0145600);

        let value = valuate(AuctionType::Interest, &auction, &ctx, &HashMap::new()).unwrap();

        assert!((value.lot_value - (120.0 * 0.099 + 210.0 * 0.9997)).abs() < 1e-9);
        assert!((value.bid_value - 728.01456 * 0.5011).abs() < 1e-6);
        assert_eq!(value.effective_collateral, 0.0);
        assert_eq!(value.repayable_liabilities, 0.0);
    }

    #[test]
    fn test_valuate_bad_debt() {
        let (pool, oracle) = fixture();
        let overrides = HashMap::new();
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CLPTOKEN", 1000_0000000);
        auction.bid.set("CEURC", 40_0000000);

        let value = valuate(AuctionType::BadDebt, &auction, &ctx, &HashMap::new()).unwrap();

        assert!((value.lot_value - 500.0).abs() < 1e-9);
        assert!((value.bid_value - 40.0 * 1.0928).abs() < 1e-9);
        assert!((value.effective_liabilities - 40.0 * 1.0928 / 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_unexpected_asset() {
        let (pool, oracle) = fixture();
        let overrides = HashMap::new();
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CXLM", 10_0000000);
        auction.bid.set("CXLM", 10_0000000);

        assert!(matches!(
            valuate(AuctionType::Interest, &auction, &ctx, &HashMap::new()),
            Err(AuctioneerError::UnexpectedAsset(_))
        ));
        assert!(matches!(
            valuate(AuctionType::BadDebt, &auction, &ctx, &HashMap::new()),
            Err(AuctioneerError::UnexpectedAsset(_))
        ));
    }

    #[test]
    fn test_missing_reserve() {
        let (pool, oracle) = fixture();
        let overrides = HashMap::new();
        let ctx = ValuationContext {
            pool: &pool,
            oracle: &oracle,
            backstop_token: "CLPTOKEN",
            lp_token_price: 0.5,
            price_overrides: &overrides,
        };
        let mut auction = AuctionData::new(100);
        auction.lot.set("CUNKNOWN", 10_0000000);

        assert!(matches!(
            valuate(AuctionType::Liquidation, &auction, &ctx, &HashMap::new()),
            Err(AuctioneerError::MissingReserve(_))
        ));
    }
}
