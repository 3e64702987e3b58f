use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use auctioneer::dependencies::{ChainClient, PoolEvent, SubmitResult, TxRequest};
use auctioneer::errors::Result;
use auctioneer::{AuctionData, AuctionType, Pool, PoolOracle, Positions, RequestType};

/// An in-memory chain for orchestration tests: one pool, seeded auctions,
/// positions and balances, and a transcript of submitted transactions.
pub struct MockChain {
    pub pool: Pool,
    pub oracle: PoolOracle,
    latest: Mutex<u32>,
    auctions: Mutex<HashMap<(String, u32), AuctionData>>,
    positions: Mutex<HashMap<String, Positions>>,
    balances: Mutex<HashMap<(String, String), i128>>,
    pub submitted: Mutex<Vec<TxRequest>>,
    pub lp_withdrawal_rate: f64,
}

impl MockChain {
    pub fn new(pool: Pool, oracle: PoolOracle) -> Self {
        MockChain {
            pool,
            oracle,
            latest: Mutex::new(0),
            auctions: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            lp_withdrawal_rate: 0.5011,
        }
    }

    pub fn set_latest(&self, ledger: u32) {
        *self.latest.lock().unwrap() = ledger;
    }

    pub fn seed_auction(&self, user: &str, auction_type: AuctionType, auction: AuctionData) {
        self.auctions
            .lock()
            .unwrap()
            .insert((user.to_string(), auction_type.as_u32()), auction);
    }

    pub fn seed_positions(&self, user: &str, positions: Positions) {
        self.positions
            .lock()
            .unwrap()
            .insert(user.to_string(), positions);
    }

    pub fn seed_balance(&self, account: &str, asset: &str, amount: i128) {
        self.balances
            .lock()
            .unwrap()
            .insert((account.to_string(), asset.to_string()), amount);
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_ledger(&self) -> Result<u32> {
        Ok(*self.latest.lock().unwrap())
    }

    async fn events_since(&self, _ledger: u32, _pools: &[String]) -> Result<Vec<PoolEvent>> {
        Ok(vec![])
    }

    async fn load_pool(&self, _pool: &str) -> Result<Pool> {
        Ok(self.pool.clone())
    }

    async fn load_oracle(&self, _pool: &Pool) -> Result<PoolOracle> {
        Ok(self.oracle.clone())
    }

    async fn load_positions(&self, _pool: &str, user: &str) -> Result<Option<Positions>> {
        Ok(self.positions.lock().unwrap().get(user).cloned())
    }

    async fn load_auction(
        &self,
        _pool: &str,
        user: &str,
        auction_type: AuctionType,
    ) -> Result<Option<AuctionData>> {
        Ok(self
            .auctions
            .lock()
            .unwrap()
            .get(&(user.to_string(), auction_type.as_u32()))
            .cloned())
    }

    async fn balance(&self, account: &str, asset: &str) -> Result<i128> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(account.to_string(), asset.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn simulate_backstop_withdrawal(&self, lp_amount: i128) -> Result<Option<i128>> {
        Ok(Some((lp_amount as f64 * self.lp_withdrawal_rate) as i128))
    }

    async fn backstop_token_spot_price(&self) -> Result<f64> {
        Ok(self.lp_withdrawal_rate)
    }

    async fn submit(&self, tx: &TxRequest) -> Result<SubmitResult> {
        // a full fill consumes the auction on chain
        if let TxRequest::SubmitRequests { requests, .. } = tx {
            for request in requests {
                let auction_type = match request.request_type {
                    RequestType::FillUserLiquidationAuction => Some(AuctionType::Liquidation),
                    RequestType::FillBadDebtAuction => Some(AuctionType::BadDebt),
                    RequestType::FillInterestAuction => Some(AuctionType::Interest),
                    _ => None,
                };
                if let Some(auction_type) = auction_type {
                    if request.amount >= 100 {
                        self.auctions
                            .lock()
                            .unwrap()
                            .remove(&(request.address.clone(), auction_type.as_u32()));
                    }
                }
            }
        }
        self.submitted.lock().unwrap().push(tx.clone());
        let ledger = *self.latest.lock().unwrap() + 1;
        Ok(SubmitResult {
            hash: format!("tx-{}", self.submitted.lock().unwrap().len()),
            ledger,
            success: true,
        })
    }
}
