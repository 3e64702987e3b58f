use std::collections::HashMap;

use crate::config::{profit_pct, AuctionProfit, Filler};
use crate::constants::{AUCTION_DURATION_BLOCKS, AUCTION_NOMINAL_BLOCK, REPAY_DUST};
use crate::errors::{AuctioneerError, Result};
use crate::oracle::PoolOracle;
use crate::pool::{Pool, PositionEstimate, Positions};

use super::auction::{bid_scalar, lot_scalar, AuctionData, AuctionType};
use super::valuation::AuctionValue;

/// Sentinel amount for withdraw-everything requests
pub const REQUEST_MAX: i128 = i128::MAX;

/// Number of attempts to find a feasible (block, percent) pair before the
/// auction is skipped for this tick
const MAX_FEASIBILITY_PASSES: u32 = 5;

/// A request submitted against the pool as part of a fill transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_type: RequestType,
    pub address: String, // asset address or liquidatee
    pub amount: i128,
}

/// The type of request to be made against the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestType {
    Supply = 0,
    Withdraw = 1,
    SupplyCollateral = 2,
    WithdrawCollateral = 3,
    Borrow = 4,
    Repay = 5,
    FillUserLiquidationAuction = 6,
    FillBadDebtAuction = 7,
    FillInterestAuction = 8,
    DeleteLiquidationAuction = 9,
}

/// The filler's designated reserve collateral for a pool.
#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    pub asset: String,
    pub min_collateral: i128,
}

/// The filler's on-chain state, loaded fresh per planning pass.
#[derive(Debug, Clone, Default)]
pub struct FillerState {
    pub balances: HashMap<String, i128>,
    pub positions: Positions,
    pub estimate: PositionEstimate,
}

/// The outcome of planning a fill.
#[derive(Debug, Clone, PartialEq)]
pub struct FillPlan {
    /// The ledger the fill should land on
    pub fill_block: u32,
    /// The percent of the auction to fill
    pub percent: u64,
    /// The request sequence, starting with the fill itself
    pub requests: Vec<Request>,
    /// Value received at the planned block and percent
    pub lot_value: f64,
    /// Value paid at the planned block and percent
    pub bid_value: f64,
}

/// Decide the block, percent, and request list for filling an auction.
///
/// The fill delay is solved against the filler's profit target, capped by the
/// force-fill flag, floored at the next ledger, and then adjusted until the
/// fill is payable (interest auctions) or leaves the filler above its safe
/// health factor (liquidation and bad debt auctions).
///
/// ### Errors
/// `InfeasibleFill` if no (block, percent) pair satisfies the filler's
/// constraints within the feasibility pass budget.
#[allow(clippy::too_many_arguments)]
pub fn plan_fill(
    filler: &Filler,
    profits: &[AuctionProfit],
    pool: &Pool,
    oracle: &PoolOracle,
    primary: Option<&PrimaryConfig>,
    auction_type: AuctionType,
    auction_user: &str,
    auction: &AuctionData,
    value: &AuctionValue,
    state: &FillerState,
    next_ledger: u32,
    backstop_token: &str,
) -> Result<FillPlan> {
    let pi = profit_pct(
        filler,
        profits,
        &auction.bid.assets(),
        &auction.lot.assets(),
    );

    // Phase A: solve the smallest delay that meets the profit target
    let mut delta = profit_target_delta(value.lot_value, value.bid_value, pi);

    // Phase B: force-fill caps the delay independent of the profit target
    if filler.force_fill(&pool.address) {
        match auction_type {
            AuctionType::Liquidation => delta = delta.min(198),
            AuctionType::Interest => delta = delta.min(350),
            AuctionType::BadDebt => (),
        }
    }

    // Phase C: never plan a block that has already passed
    if auction.block + delta < next_ledger {
        delta = (next_ledger - auction.block).min(AUCTION_DURATION_BLOCKS);
    }

    // Phase D: feasibility
    match auction_type {
        AuctionType::Interest => {
            plan_interest_feasibility(auction, value, state, auction_user, backstop_token, delta)
        }
        AuctionType::Liquidation | AuctionType::BadDebt => plan_position_feasibility(
            filler,
            pool,
            oracle,
            primary,
            auction_type,
            auction_user,
            auction,
            value,
            state,
            delta,
        ),
    }
}

/// The smallest integer block delay at which the auction meets the profit
/// target, clamped to the auction window.
fn profit_target_delta(lot_value: f64, bid_value: f64, pi: f64) -> u32 {
    let delta = if lot_value >= bid_value * (1.0 + pi) {
        // profitable before the bid starts decaying
        if lot_value <= 0.0 {
            0.0
        } else {
            200.0 - (lot_value - bid_value * (1.0 + pi)) / (lot_value / 200.0)
        }
    } else {
        // wait for the bid to decay to the target
        if bid_value <= 0.0 {
            0.0
        } else {
            200.0 + (bid_value - lot_value * (1.0 - pi)) / (bid_value / 200.0)
        }
    };
    (delta.ceil().clamp(0.0, AUCTION_DURATION_BLOCKS as f64)) as u32
}

/// Interest auctions are paid in full out of the filler's backstop LP
/// balance. If the balance cannot cover the scaled bid, wait for the bid to
/// decay down to it.
fn plan_interest_feasibility(
    auction: &AuctionData,
    value: &AuctionValue,
    state: &FillerState,
    auction_user: &str,
    backstop_token: &str,
    mut delta: u32,
) -> Result<FillPlan> {
    let base_bid = auction
        .bid
        .get(backstop_token)
        .ok_or_else(|| AuctioneerError::UnexpectedAsset(backstop_token.to_string()))?
        as f64;
    let balance = state.balances.get(backstop_token).copied().unwrap_or(0) as f64;

    let bid_scaled = base_bid * bid_scalar(delta);
    if bid_scaled > balance {
        let step = base_bid / AUCTION_NOMINAL_BLOCK as f64;
        let additional = ((bid_scaled - balance) / step).ceil() as u32;
        delta = (delta + additional).min(AUCTION_DURATION_BLOCKS);
    }

    let requests = vec![Request {
        request_type: RequestType::FillInterestAuction,
        address: auction_user.to_string(),
        amount: 100,
    }];
    Ok(FillPlan {
        fill_block: auction.block + delta,
        percent: 100,
        requests,
        lot_value: value.lot_value * lot_scalar(delta),
        bid_value: value.bid_value * bid_scalar(delta),
    })
}

/// Liquidation and bad debt fills take the bid on as debt, so the filler must
/// stay above its safe health factor. Each pass simulates the repayments and
/// primary-collateral top-up available to the filler, then either accepts,
/// scales the fill percent down to the fraction that fits, or pushes the fill
/// block into the bid decay region.
#[allow(clippy::too_many_arguments)]
fn plan_position_feasibility(
    filler: &Filler,
    pool: &Pool,
    oracle: &PoolOracle,
    primary: Option<&PrimaryConfig>,
    auction_type: AuctionType,
    auction_user: &str,
    auction: &AuctionData,
    value: &AuctionValue,
    state: &FillerState,
    mut delta: u32,
) -> Result<FillPlan> {
    let min_hf = filler.min_health_factor(&pool.address);
    let safe_hf = min_hf * 1.1;
    let estimate = &state.estimate;

    let mut percent: u64 = 100;
    for _ in 0..MAX_FEASIBILITY_PASSES {
        let lot_mod = lot_scalar(delta);
        let bid_mod = bid_scalar(delta);
        let frac = percent as f64 / 100.0;
        let incoming_collateral = value.effective_collateral * lot_mod * frac;
        let incoming_liabilities = value.effective_liabilities * bid_mod * frac;
        let mut limit_to_hf = (estimate.collateral_base + incoming_collateral) / safe_hf
            - (estimate.liability_base + incoming_liabilities);

        let mut requests: Vec<Request> = Vec::new();
        let mut balances = state.balances.clone();
        let mut repaid_effective = 0.0;

        // repay whatever the wallet covers of the incoming debt
        for (asset, d_tokens) in auction.bid.iter() {
            let reserve = pool.reserve(asset)?;
            let balance = balances.get(asset).copied().unwrap_or(0);
            if balance <= 0 {
                continue;
            }
            // dust offset so a full repay leaves no residual liability
            let underlying = reserve.to_asset_from_d_token(d_tokens) + REPAY_DUST;
            let repaid = underlying.min(balance);
            let price = oracle.price(asset)?;
            let effective = reserve.to_float((repaid - REPAY_DUST).max(0)) * price
                / reserve.liability_factor();
            limit_to_hf += effective;
            repaid_effective += effective;
            balances.insert(asset.clone(), balance - repaid);
            requests.push(Request {
                request_type: RequestType::Repay,
                address: asset.clone(),
                amount: repaid,
            });
        }

        // worthless collateral would eat a position slot with no HF upside
        if auction_type == AuctionType::Liquidation {
            for (asset, _) in auction.lot.iter() {
                let reserve = pool.reserve(asset)?;
                if reserve.c_factor == 0 {
                    requests.push(Request {
                        request_type: RequestType::WithdrawCollateral,
                        address: asset.clone(),
                        amount: REQUEST_MAX,
                    });
                }
            }
        }

        // top up primary collateral from the wallet if the fill overruns the
        // health factor room
        let mut supplied_effective = 0.0;
        if limit_to_hf < 0.0 {
            if let Some(primary) = primary {
                let reserve = pool.reserve(&primary.asset)?;
                let balance = balances.get(&primary.asset).copied().unwrap_or(0);
                if balance > 0 && reserve.c_factor > 0 {
                    let price = oracle.price(&primary.asset)?;
                    let needed =
                        (-limit_to_hf) * safe_hf / (reserve.collateral_factor() * price);
                    // deposits are sized in whole tokens of the primary asset
                    let deposit = (needed.ceil() as i128 * reserve.scalar).min(balance);
                    if deposit > 0 {
                        let effective =
                            reserve.to_float(deposit) * reserve.collateral_factor() * price;
                        supplied_effective = effective;
                        limit_to_hf += effective / safe_hf;
                        balances.insert(primary.asset.clone(), balance - deposit);
                        requests.push(Request {
                            request_type: RequestType::SupplyCollateral,
                            address: primary.asset.clone(),
                            amount: deposit,
                        });
                    }
                }
            }
        }

        let net_incoming = incoming_liabilities - repaid_effective;
        if limit_to_hf >= 0.0 || net_incoming <= 0.0 {
            return Ok(accept(
                auction_type,
                auction_user,
                auction,
                value,
                delta,
                percent,
                requests,
            ));
        }

        // the fill does not fit. scale the percent down to the fraction the
        // current HF room can absorb
        let pre_borrow_limit = (estimate.collateral_base
            + value.effective_collateral * lot_mod
            + supplied_effective)
            / safe_hf
            - estimate.liability_base
            + repaid_effective;
        let fits = (pre_borrow_limit / net_incoming).clamp(0.0, 1.0);
        let adjusted = (fits * percent as f64).floor() as u64;

        if adjusted < 1 {
            // nothing fits at this block. walk the bid down instead
            let limit_at_nominal = (estimate.collateral_base + value.effective_collateral * frac)
                / safe_hf
                - (estimate.liability_base + value.effective_liabilities * frac)
                + repaid_effective
                + supplied_effective / safe_hf;
            let excess_pct = if value.effective_liabilities > 0.0 {
                (100.0 * limit_at_nominal.min(0.0).abs() / value.effective_liabilities).ceil()
            } else {
                0.0
            };
            delta = (200 + (excess_pct * 2.0) as u32).min(AUCTION_DURATION_BLOCKS);
            continue;
        }
        if adjusted < percent {
            percent = adjusted;
            continue;
        }
        return Ok(accept(
            auction_type,
            auction_user,
            auction,
            value,
            delta,
            percent,
            requests,
        ));
    }

    Err(AuctioneerError::InfeasibleFill)
}

fn accept(
    auction_type: AuctionType,
    auction_user: &str,
    auction: &AuctionData,
    value: &AuctionValue,
    delta: u32,
    percent: u64,
    mut requests: Vec<Request>,
) -> FillPlan {
    let fill_type = match auction_type {
        AuctionType::Liquidation => RequestType::FillUserLiquidationAuction,
        AuctionType::BadDebt => RequestType::FillBadDebtAuction,
        AuctionType::Interest => RequestType::FillInterestAuction,
    };
    requests.insert(
        0,
        Request {
            request_type: fill_type,
            address: auction_user.to_string(),
            amount: percent as i128,
        },
    );
    let frac = percent as f64 / 100.0;
    FillPlan {
        fill_block: auction.block + delta,
        percent,
        requests,
        lot_value: value.lot_value * lot_scalar(delta) * frac,
        bid_value: value.bid_value * bid_scalar(delta) * frac,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_target_delta_profitable_before_nominal() {
        // lot 100, bid 80, 10% target: profitable margin of 12 over 0.5/block
        let delta = profit_target_delta(100.0, 80.0, 0.1);
        // 200 - (100 - 88) / 0.5 = 176
        assert_eq!(delta, 176);
    }

    #[test]
    fn test_profit_target_delta_needs_decay() {
        // lot 100, bid 200, 10% target: wait for bid to decay to 90
        let delta = profit_target_delta(100.0, 200.0, 0.1);
        // 200 + (200 - 90) / 1.0 = 310
        assert_eq!(delta, 310);
    }

    #[test]
    fn test_profit_target_delta_clamps() {
        assert_eq!(profit_target_delta(1000.0, 0.0, 0.1), 0);
        assert_eq!(profit_target_delta(0.0, 100.0, 0.1), 400);
        assert_eq!(profit_target_delta(0.0, 0.0, 0.1), 0);
    }

    #[test]
    fn test_monotone_profit_block() {
        // profitable auctions fill at or before the nominal block,
        // unprofitable ones after it
        for (lot, bid) in [(150.0, 100.0), (110.01, 100.0), (200.0, 10.0)] {
            assert!(profit_target_delta(lot, bid, 0.1) <= 200, "{lot}/{bid}");
        }
        for (lot, bid) in [(109.9, 100.0), (50.0, 100.0), (0.5, 100.0)] {
            assert!(profit_target_delta(lot, bid, 0.1) > 200, "{lot}/{bid}");
        }
    }
}
