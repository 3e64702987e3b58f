use std::collections::HashMap;

use auctioneer::auctions::{bid_scalar, lot_scalar};
use auctioneer::{
    manage_positions, plan_fill, plan_liquidation_auction, AuctionType, PositionEstimate,
    Positions,
};
use test_suites::{TestFixture, BACKSTOP, BACKSTOP_LP, EURC, USDC, XLM};

/// At the nominal block both modifiers are exactly one and the scaled
/// auction equals the snapshot.
#[test]
fn test_scalar_identity_at_nominal_block() {
    assert_eq!(lot_scalar(200), 1.0);
    assert_eq!(bid_scalar(200), 1.0);

    let fixture = TestFixture::create();
    let auction = fixture.auction(
        1000,
        vec![(USDC, 55_1234567)],
        vec![(XLM, 987_7654321)],
    );
    let (scaled, remaining) = auction.scale(1200, 100);
    assert_eq!(scaled, auction);
    assert!(remaining.is_none());
}

/// Planner outputs stay inside the auction window and the valid percent
/// range across a sweep of profitability regimes.
#[test]
fn test_plan_clamps() {
    let fixture = TestFixture::create();
    let filler = fixture.filler(false);
    let auction = fixture.auction(
        1000,
        vec![(USDC, 100_0000000)],
        vec![(BACKSTOP_LP, 728_0145600)],
    );
    for lp_price in [0.0001, 0.05, 0.1373, 0.5, 2.0, 50.0] {
        let mut sweep = TestFixture::create();
        sweep.lp_token_price = lp_price;
        let state = sweep.filler_state(0.0, 0.0, vec![(BACKSTOP_LP, 100000_0000000)]);
        let value = sweep.valuate(AuctionType::Interest, &auction, &state.balances);
        let plan = plan_fill(
            &filler,
            &[],
            &sweep.pool,
            &sweep.oracle,
            None,
            AuctionType::Interest,
            BACKSTOP,
            &auction,
            &value,
            &state,
            1001,
            BACKSTOP_LP,
        )
        .unwrap();
        let delta = plan.fill_block - auction.block;
        assert!(delta <= 400, "delta {} at lp price {}", delta, lp_price);
        assert!(plan.percent >= 1 && plan.percent <= 100);
    }
}

/// Auctions already meeting the profit target fill at or before the nominal
/// block; auctions that don't fill after it.
#[test]
fn test_monotone_profit_block() {
    let fixture = TestFixture::create();
    let filler = fixture.filler(false);
    let state = fixture.filler_state(0.0, 0.0, vec![(BACKSTOP_LP, 100000_0000000)]);

    // lot 100 USDC ~= 99.97; bid value swept around the profit boundary
    let auction = fixture.auction(
        1000,
        vec![(USDC, 100_0000000)],
        vec![(BACKSTOP_LP, 100_0000000)],
    );
    for (lp_price, expect_early) in [(0.2, true), (0.9087, true), (0.909, false), (3.0, false)] {
        let mut sweep = TestFixture::create();
        sweep.lp_token_price = lp_price;
        let value = sweep.valuate(AuctionType::Interest, &auction, &state.balances);
        let profitable = value.lot_value >= value.bid_value * 1.1;
        assert_eq!(profitable, expect_early, "lp price {}", lp_price);
        let plan = plan_fill(
            &filler,
            &[],
            &sweep.pool,
            &sweep.oracle,
            None,
            AuctionType::Interest,
            BACKSTOP,
            &auction,
            &value,
            &state,
            1001,
            BACKSTOP_LP,
        )
        .unwrap();
        let delta = plan.fill_block - auction.block;
        if expect_early {
            assert!(delta <= 200, "delta {} at lp price {}", delta, lp_price);
        } else {
            assert!(delta > 200, "delta {} at lp price {}", delta, lp_price);
        }
    }
}

/// The planned block never lands before the next ledger, and the window cap
/// wins when the next ledger is beyond the auction's end.
#[test]
fn test_next_ledger_safety() {
    let fixture = TestFixture::create();
    let filler = fixture.filler(false);
    let auction = fixture.auction(
        1000,
        vec![(USDC, 100_0000000)],
        vec![(BACKSTOP_LP, 100_0000000)],
    );
    let state = fixture.filler_state(0.0, 0.0, vec![(BACKSTOP_LP, 100000_0000000)]);
    let value = fixture.valuate(AuctionType::Interest, &auction, &state.balances);

    // profit target is met almost immediately, but the chain has moved on
    for next_ledger in [1005, 1100, 1250, 1399] {
        let plan = plan_fill(
            &filler,
            &[],
            &fixture.pool,
            &fixture.oracle,
            None,
            AuctionType::Interest,
            BACKSTOP,
            &auction,
            &value,
            &state,
            next_ledger,
            BACKSTOP_LP,
        )
        .unwrap();
        assert!(plan.fill_block >= next_ledger, "next ledger {}", next_ledger);
    }

    // past the end of the window the plan is bounded by block + 400
    let plan = plan_fill(
        &filler,
        &[],
        &fixture.pool,
        &fixture.oracle,
        None,
        AuctionType::Interest,
        BACKSTOP,
        &auction,
        &value,
        &state,
        1500,
        BACKSTOP_LP,
    )
    .unwrap();
    assert_eq!(plan.fill_block, 1400);
}

/// Liquidation proposals rank both sides by effective value and leave a
/// position slot free for the filler.
#[test]
fn test_proposal_sort_order_and_slot_bound() {
    let fixture = TestFixture::create();
    let mut positions = Positions::default();
    positions.add_collateral(0, 3000_0000000); // XLM, eff ~268.6
    positions.add_collateral(1, 100_0000000); // USDC, eff ~95.5
    positions.add_collateral(2, 90_0000000); // EURC, eff ~93.9
    positions.add_liabilities(0, 2200_0000000); // XLM, eff ~242.0
    positions.add_liabilities(2, 200_0000000); // EURC, eff ~230.1

    let estimate =
        PositionEstimate::from_positions(&fixture.pool, &fixture.oracle, &positions).unwrap();
    assert!(estimate.is_liquidatable());

    let proposal = plan_liquidation_auction(&fixture.pool, &fixture.oracle, &positions)
        .unwrap()
        .expect("proposal");

    assert!(proposal.bid.len() + proposal.lot.len() <= fixture.pool.max_positions as usize - 1);
    // strictly non-increasing effective value on both sides
    let lot_values: Vec<f64> = proposal
        .lot
        .iter()
        .map(|asset| {
            let reserve = fixture.pool.reserve(asset).unwrap();
            let index = reserve.index;
            let b_tokens = positions.get_collateral(index);
            reserve.to_float(reserve.to_effective_asset_from_b_token(b_tokens))
                * fixture.oracle.price(asset).unwrap()
        })
        .collect();
    assert!(lot_values.windows(2).all(|w| w[0] >= w[1]));
    let bid_values: Vec<f64> = proposal
        .bid
        .iter()
        .map(|asset| {
            let reserve = fixture.pool.reserve(asset).unwrap();
            let d_tokens = positions.get_liabilities(reserve.index);
            reserve.to_float(reserve.to_effective_asset_from_d_token(d_tokens))
                * fixture.oracle.price(asset).unwrap()
        })
        .collect();
    assert!(bid_values.windows(2).all(|w| w[0] >= w[1]));
}

/// Unwinding an empty book produces no requests, and re-running the same
/// inputs stays empty.
#[test]
fn test_unwind_idempotence() {
    let fixture = TestFixture::create();
    let filler = fixture.filler(false);
    let primary = fixture.primary();

    let first = manage_positions(
        &filler,
        &fixture.pool,
        &fixture.oracle,
        Some(&primary),
        &Positions::default(),
        &HashMap::new(),
    )
    .unwrap();
    assert!(first.is_empty());

    let second = manage_positions(
        &filler,
        &fixture.pool,
        &fixture.oracle,
        Some(&primary),
        &Positions::default(),
        &HashMap::new(),
    )
    .unwrap();
    assert!(second.is_empty());

    // a primary position parked at its floor is also a fixed point
    let mut at_floor = Positions::default();
    at_floor.add_collateral(1, fixture.pool.reserve(USDC).unwrap().to_b_token_down(500_0000000));
    let requests = manage_positions(
        &filler,
        &fixture.pool,
        &fixture.oracle,
        Some(&primary),
        &at_floor,
        &HashMap::new(),
    )
    .unwrap();
    assert!(requests.is_empty());

    let again = manage_positions(
        &filler,
        &fixture.pool,
        &fixture.oracle,
        Some(&primary),
        &at_floor,
        &HashMap::new(),
    )
    .unwrap();
    assert!(again.is_empty());
}

/// The effective count of a proposal's user positions obeys the pool cap.
#[test]
fn test_subset_bound_many_positions() {
    let fixture = TestFixture::create();
    let mut positions = Positions::default();
    for index in 0..3u32 {
        positions.add_collateral(index, 500_0000000);
    }
    positions.add_liabilities(0, 4000_0000000);
    positions.add_liabilities(1, 1200_0000000);
    positions.add_liabilities(2, 900_0000000);

    if let Some(proposal) =
        plan_liquidation_auction(&fixture.pool, &fixture.oracle, &positions).unwrap()
    {
        assert!(
            proposal.bid.len() + proposal.lot.len() <= fixture.pool.max_positions as usize - 1
        );
    }
}
