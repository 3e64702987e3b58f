use crate::errors::Result;
use crate::oracle::PoolOracle;
use crate::pool::{Pool, PositionEstimate, Positions};

/// A proposed new auction, ready to submit to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionProposal {
    pub percent: u64,
    /// Liability assets, largest effective value first
    pub bid: Vec<String>,
    /// Collateral assets, largest effective value first
    pub lot: Vec<String>,
}

#[derive(Debug, Clone)]
struct PositionValue {
    asset: String,
    /// Effective value in the quote currency
    base: f64,
    /// Raw value in the quote currency
    raw: f64,
}

/// Search for the cheapest valid liquidation of a user.
///
/// Collateral and liability assets are ranked by effective value, and ordered
/// prefix pairs are searched for the smallest integer percent that restores
/// the user to solvency once the auction settles at nominal value. Smaller
/// prefixes win ties so the auction consumes as few position slots as
/// possible, always leaving one slot free for the filler.
///
/// Returns `None` when no prefix pair admits a valid percent.
pub fn plan_liquidation_auction(
    pool: &Pool,
    oracle: &PoolOracle,
    positions: &Positions,
) -> Result<Option<AuctionProposal>> {
    let estimate = PositionEstimate::from_positions(pool, oracle, positions)?;
    if !estimate.is_liquidatable() {
        return Ok(None);
    }

    let collateral = ranked_collateral(pool, oracle, positions)?;
    let liabilities = ranked_liabilities(pool, oracle, positions)?;
    if collateral.is_empty() || liabilities.is_empty() {
        return Ok(None);
    }

    // leave a position slot for the filler
    let max_slots = pool.max_positions.saturating_sub(1) as usize;

    let mut best: Option<(u64, usize, AuctionProposal)> = None;
    for num_lot in 1..=collateral.len() {
        for num_bid in 1..=liabilities.len() {
            let slots = num_lot + num_bid;
            if slots > max_slots {
                continue;
            }
            let lot_prefix = &collateral[..num_lot];
            let bid_prefix = &liabilities[..num_bid];
            if let Some(percent) = smallest_valid_percent(&estimate, lot_prefix, bid_prefix) {
                let better = match &best {
                    Some((best_pct, best_slots, _)) => {
                        percent < *best_pct || (percent == *best_pct && slots < *best_slots)
                    }
                    None => true,
                };
                if better {
                    best = Some((
                        percent,
                        slots,
                        AuctionProposal {
                            percent,
                            bid: bid_prefix.iter().map(|p| p.asset.clone()).collect(),
                            lot: lot_prefix.iter().map(|p| p.asset.clone()).collect(),
                        },
                    ));
                }
            }
        }
    }
    Ok(best.map(|(_, _, proposal)| proposal))
}

/// Propose a bad debt auction against the backstop's assigned positions:
/// the full backstop LP lot against the largest liabilities that fit.
pub fn plan_bad_debt_auction(
    pool: &Pool,
    oracle: &PoolOracle,
    backstop_positions: &Positions,
    backstop_token: &str,
) -> Result<Option<AuctionProposal>> {
    let estimate = PositionEstimate::from_positions(pool, oracle, backstop_positions)?;
    if !estimate.is_bad_debt() {
        return Ok(None);
    }
    let liabilities = ranked_liabilities(pool, oracle, backstop_positions)?;
    if liabilities.is_empty() {
        return Ok(None);
    }
    let top_k = liabilities
        .len()
        .min(pool.max_positions.saturating_sub(1) as usize);
    Ok(Some(AuctionProposal {
        percent: 100,
        bid: liabilities[..top_k].iter().map(|p| p.asset.clone()).collect(),
        lot: vec![backstop_token.to_string()],
    }))
}

/// The smallest integer percent in [1, 100] for which liquidating the prefix
/// pair leaves the user with collateral covering liabilities.
fn smallest_valid_percent(
    estimate: &PositionEstimate,
    lot_prefix: &[PositionValue],
    bid_prefix: &[PositionValue],
) -> Option<u64> {
    let lot_base: f64 = lot_prefix.iter().map(|p| p.base).sum();
    let lot_raw: f64 = lot_prefix.iter().map(|p| p.raw).sum();
    let bid_base: f64 = bid_prefix.iter().map(|p| p.base).sum();
    let bid_raw: f64 = bid_prefix.iter().map(|p| p.raw).sum();
    if lot_raw <= 0.0 || bid_raw <= 0.0 {
        return None;
    }

    // auction incentive as the pool prices it: half the spread between the
    // subset's average collateral and liability factors
    let cf_subset = lot_base / lot_raw;
    let lf_subset = bid_base / bid_raw;
    let incentive = 1.0 + (1.0 - cf_subset / lf_subset) / 2.0;

    for percent in 1..=100u64 {
        let frac = percent as f64 / 100.0;
        // collateral leaves the user scaled by the value the auction must
        // cover, liabilities by the liquidated percent directly
        let withdrawn_raw = bid_raw * frac * incentive;
        let withdrawn_frac = (withdrawn_raw / lot_raw).min(1.0);
        let post_collateral = estimate.collateral_base - lot_base * withdrawn_frac;
        let post_liabilities = estimate.liability_base - bid_base * frac;
        if post_collateral >= post_liabilities {
            return Some(percent);
        }
    }
    None
}

fn ranked_collateral(
    pool: &Pool,
    oracle: &PoolOracle,
    positions: &Positions,
) -> Result<Vec<PositionValue>> {
    let mut values = Vec::new();
    for (index, b_tokens) in positions.collateral.iter() {
        let reserve = pool.reserve_by_index(*index)?;
        let price = oracle.price(&reserve.asset)?;
        values.push(PositionValue {
            asset: reserve.asset.clone(),
            base: reserve.to_float(reserve.to_effective_asset_from_b_token(*b_tokens)) * price,
            raw: reserve.to_float(reserve.to_asset_from_b_token(*b_tokens)) * price,
        });
    }
    sort_descending(&mut values);
    Ok(values)
}

fn ranked_liabilities(
    pool: &Pool,
    oracle: &PoolOracle,
    positions: &Positions,
) -> Result<Vec<PositionValue>> {
    let mut values = Vec::new();
    for (index, d_tokens) in positions.liabilities.iter() {
        let reserve = pool.reserve_by_index(*index)?;
        let price = oracle.price(&reserve.asset)?;
        values.push(PositionValue {
            asset: reserve.asset.clone(),
            base: reserve.to_float(reserve.to_effective_asset_from_d_token(*d_tokens)) * price,
            raw: reserve.to_float(reserve.to_asset_from_d_token(*d_tokens)) * price,
        });
    }
    sort_descending(&mut values);
    Ok(values)
}

fn sort_descending(values: &mut [PositionValue]) {
    values.sort_by(|a, b| b.base.partial_cmp(&a.base).unwrap());
}
