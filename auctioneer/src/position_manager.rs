use std::collections::{HashMap, HashSet};

use crate::auctions::{PrimaryConfig, Request, RequestType, REQUEST_MAX};
use crate::config::Filler;
use crate::errors::Result;
use crate::oracle::PoolOracle;
use crate::pool::{Pool, PositionEstimate, Positions};

/// Build the request sequence that restores a filler to a safe state after
/// winning auctions: repay what the wallet covers, then shed collateral.
///
/// Withdrawals are ordered so that positions sharing an asset with leftover
/// debt go first (clearing them costs no net position slot), the smallest
/// positions follow, and the primary collateral goes last, floored at the
/// configured minimum.
pub fn manage_positions(
    filler: &Filler,
    pool: &Pool,
    oracle: &PoolOracle,
    primary: Option<&PrimaryConfig>,
    positions: &Positions,
    balances: &HashMap<String, i128>,
) -> Result<Vec<Request>> {
    let min_hf = filler.min_health_factor(&pool.address);
    let mut requests: Vec<Request> = Vec::new();

    // repay every liability the wallet has funds for, tracking assets that
    // still carry debt afterwards
    let mut post_repay = positions.clone();
    let mut residual: HashSet<u32> = HashSet::new();
    for (index, d_tokens) in positions.liabilities.iter() {
        let reserve = pool.reserve_by_index(*index)?;
        let balance = balances.get(&reserve.asset).copied().unwrap_or(0);
        if balance > 0 {
            requests.push(Request {
                request_type: RequestType::Repay,
                address: reserve.asset.clone(),
                amount: balance,
            });
            let repaid_d_tokens = reserve.to_d_token_down(balance).min(*d_tokens);
            post_repay.remove_liabilities(*index, repaid_d_tokens);
            if repaid_d_tokens < *d_tokens {
                residual.insert(*index);
            }
        } else {
            residual.insert(*index);
        }
    }

    // too close to the floor to shed anything
    let estimate = PositionEstimate::from_positions(pool, oracle, &post_repay)?;
    if estimate.liability_base > 0.0 && estimate.as_health_factor() < min_hf * 1.01 {
        return Ok(requests);
    }

    // rank the collateral for withdrawal
    struct Candidate {
        index: u32,
        score: f64,
        underlying_held: f64,
        effective_value: f64,
        price: f64,
    }
    let mut candidates: Vec<Candidate> = Vec::new();
    for (index, b_tokens) in post_repay.collateral.iter() {
        let reserve = pool.reserve_by_index(*index)?;
        let price = oracle.price(&reserve.asset)?;
        let effective_value =
            reserve.to_float(reserve.to_effective_asset_from_b_token(*b_tokens)) * price;
        let score = if residual.contains(index) {
            0.0
        } else if primary.map(|p| p.asset == reserve.asset).unwrap_or(false) {
            f64::INFINITY
        } else {
            effective_value
        };
        candidates.push(Candidate {
            index: *index,
            score,
            underlying_held: reserve.to_float(reserve.to_asset_from_b_token(*b_tokens)),
            effective_value,
            price,
        });
    }
    candidates.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());

    let mut collateral_base = estimate.collateral_base;
    let liability_base = estimate.liability_base;
    for candidate in candidates {
        let reserve = pool.reserve_by_index(candidate.index)?;
        let is_primary = primary.map(|p| p.asset == reserve.asset).unwrap_or(false);
        let primary_floor = primary
            .filter(|p| p.asset == reserve.asset)
            .map(|p| reserve.to_float(p.min_collateral))
            .unwrap_or(0.0);

        if liability_base <= 0.0 {
            if is_primary {
                // keep the operating floor in place
                let available = candidate.underlying_held - primary_floor;
                if available < primary_floor * 0.01 {
                    continue;
                }
                requests.push(Request {
                    request_type: RequestType::WithdrawCollateral,
                    address: reserve.asset.clone(),
                    amount: reserve.to_fixed_ceil(available),
                });
            } else {
                requests.push(Request {
                    request_type: RequestType::WithdrawCollateral,
                    address: reserve.asset.clone(),
                    amount: REQUEST_MAX,
                });
            }
            collateral_base -= candidate.effective_value;
            continue;
        }

        if collateral_base / liability_base < min_hf * 1.005 {
            break;
        }

        // worthless collateral carries no HF weight, withdraw it whole
        if reserve.c_factor == 0 {
            requests.push(Request {
                request_type: RequestType::WithdrawCollateral,
                address: reserve.asset.clone(),
                amount: REQUEST_MAX,
            });
            continue;
        }

        let mut max_withdraw = (collateral_base - liability_base * min_hf)
            / (reserve.collateral_factor() * candidate.price);
        if max_withdraw > candidate.underlying_held {
            // the whole position fits inside the HF budget
            if is_primary {
                let available = candidate.underlying_held - primary_floor;
                if available < primary_floor * 0.01 {
                    continue;
                }
                requests.push(Request {
                    request_type: RequestType::WithdrawCollateral,
                    address: reserve.asset.clone(),
                    amount: reserve.to_fixed_ceil(available),
                });
                collateral_base -=
                    available * reserve.collateral_factor() * candidate.price;
            } else {
                requests.push(Request {
                    request_type: RequestType::WithdrawCollateral,
                    address: reserve.asset.clone(),
                    amount: REQUEST_MAX,
                });
                collateral_base -= candidate.effective_value;
            }
            continue;
        }

        // partial withdrawal
        if is_primary {
            let cap = candidate.underlying_held - primary_floor;
            max_withdraw = max_withdraw.min(cap);
            if max_withdraw < primary_floor * 0.01 {
                continue;
            }
        }
        if max_withdraw <= 0.0 {
            continue;
        }
        requests.push(Request {
            request_type: RequestType::WithdrawCollateral,
            address: reserve.asset.clone(),
            amount: reserve.to_fixed_ceil(max_withdraw),
        });
        collateral_base -= max_withdraw * reserve.collateral_factor() * candidate.price;
        // partials on assets without leftover debt only produce dust loops
        if !residual.contains(&candidate.index) {
            break;
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SCALAR_7;
    use crate::pool::Reserve;

    fn fixture() -> (Pool, PoolOracle, Filler) {
        let assets = [
            // (asset, index, c_factor, l_factor, price)
            ("CXLM", 0u32, 0_9000000u32, 0_9000000u32, 0_1000000i128),
            ("CUSDC", 1, 0_9500000, 0_9500000, 1_0000000),
            ("CEURC", 2, 0_9000000, 0_9000000, 1_1000000),
            ("CAQUA", 3, 0_0000000, 0_7000000, 0_0010000),
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
        let filler = Filler {
            name: "tower".to_string(),
            keypair: stellar_strkey::ed25519::PrivateKey([3u8; 32]).to_string(),
            default_profit_pct: 0.1,
            min_health_factor: 1.2,
            force_fill: false,
            supported_bid: vec![],
            supported_lot: vec![],
            supported_pools: vec![],
        };
        (pool, PoolOracle::new(7, prices), filler)
    }

    #[test]
    fn test_empty_positions_is_noop() {
        let (pool, oracle, filler) = fixture();
        let requests = manage_positions(
            &filler,
            &pool,
            &oracle,
            None,
            &Positions::default(),
            &HashMap::new(),
        )
        .unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_noop_is_stable() {
        let (pool, oracle, filler) = fixture();
        let primary = PrimaryConfig {
            asset: "CUSDC".to_string(),
            min_collateral: 1000_0000000,
        };
        // only the primary position at its floor remains
        let mut positions = Positions::default();
        positions.add_collateral(1, 1000_0000000);

        let first = manage_positions(
            &filler,
            &pool,
            &oracle,
            Some(&primary),
            &positions,
            &HashMap::new(),
        )
        .unwrap();
        assert!(first.is_empty());
        let second = manage_positions(
            &filler,
            &pool,
            &oracle,
            Some(&primary),
            &positions,
            &HashMap::new(),
        )
        .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_repays_from_wallet() {
        let (pool, oracle, filler) = fixture();
        let mut positions = Positions::default();
        positions.add_collateral(1, 200_0000000);
        positions.add_liabilities(0, 100_0000000);
        let mut balances = HashMap::new();
        balances.insert("CXLM".to_string(), 150_0000000i128);

        let requests =
            manage_positions(&filler, &pool, &oracle, None, &positions, &balances).unwrap();

        assert_eq!(requests[0].request_type, RequestType::Repay);
        assert_eq!(requests[0].address, "CXLM");
        assert_eq!(requests[0].amount, 150_0000000);
        // the debt is fully repaid, so the collateral comes out whole
        assert_eq!(
            requests[1],
            Request {
                request_type: RequestType::WithdrawCollateral,
                address: "CUSDC".to_string(),
                amount: REQUEST_MAX,
            }
        );
    }

    #[test]
    fn test_short_circuit_near_floor() {
        let (pool, oracle, filler) = fixture();
        // collateral eff 190, liabilities eff ~158: HF ~1.2 < 1.2 * 1.01
        let mut positions = Positions::default();
        positions.add_collateral(1, 200_0000000);
        positions.add_liabilities(1, 150_0000000);

        let requests =
            manage_positions(&filler, &pool, &oracle, None, &positions, &HashMap::new()).unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_residual_liability_collateral_goes_first() {
        let (pool, oracle, filler) = fixture();
        let mut positions = Positions::default();
        // debt in XLM with no wallet balance, plus collateral in XLM and USDC
        positions.add_collateral(0, 200_0000000); // eff 18
        positions.add_collateral(1, 800_0000000); // eff 760
        positions.add_liabilities(0, 300_0000000); // eff 33.3

        let requests =
            manage_positions(&filler, &pool, &oracle, None, &positions, &HashMap::new()).unwrap();

        // the shared-asset position is shed first despite being smaller
        assert!(!requests.is_empty());
        assert_eq!(requests[0].request_type, RequestType::WithdrawCollateral);
        assert_eq!(requests[0].address, "CXLM");
    }

    #[test]
    fn test_partial_withdraw_respects_hf() {
        let (pool, oracle, filler) = fixture();
        let mut positions = Positions::default();
        positions.add_collateral(1, 500_0000000); // eff 475
        positions.add_liabilities(0, 2000_0000000); // eff 222.2

        let requests =
            manage_positions(&filler, &pool, &oracle, None, &positions, &HashMap::new()).unwrap();

        // withdrawing everything would break the HF floor, so a partial
        // withdrawal of (475 - 222.2 * 1.2) / 0.95 underlying comes out
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_type, RequestType::WithdrawCollateral);
        assert_eq!(requests[0].address, "CUSDC");
        let expected = (475.0 - (2000.0 * 0.1 / 0.9) * 1.2) / 0.95;
        let amount = requests[0].amount as f64 / SCALAR_7 as f64;
        assert!((amount - expected).abs() < 1e-5, "amount {amount}");
    }

    #[test]
    fn test_primary_withdrawn_last_with_floor() {
        let (pool, oracle, filler) = fixture();
        let primary = PrimaryConfig {
            asset: "CUSDC".to_string(),
            min_collateral: 500_0000000,
        };
        let mut positions = Positions::default();
        positions.add_collateral(0, 100_0000000); // eff 9
        positions.add_collateral(1, 800_0000000); // primary
        positions.add_collateral(2, 50_0000000); // eff 49.5

        let requests = manage_positions(
            &filler,
            &pool,
            &oracle,
            Some(&primary),
            &positions,
            &HashMap::new(),
        )
        .unwrap();

        // smallest first, primary last and floored at 500
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].address, "CXLM");
        assert_eq!(requests[0].amount, REQUEST_MAX);
        assert_eq!(requests[1].address, "CEURC");
        assert_eq!(requests[1].amount, REQUEST_MAX);
        assert_eq!(requests[2].address, "CUSDC");
        assert_eq!(requests[2].amount, 300_0000000);
    }
}
