use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auctions::{AuctionData, AuctionType, Request};
use crate::errors::Result;
use crate::oracle::PoolOracle;
use crate::pool::{Pool, Positions};
use crate::storage::PriceEntry;

/// How many balance simulations run concurrently per batch
const BALANCE_FAN_OUT: usize = 5;

/// A transaction the bot submits to the chain. Encoding and signing live
/// behind the `ChainClient` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    /// A batch of pool requests submitted on behalf of a filler
    SubmitRequests {
        pool: String,
        filler: String,
        requests: Vec<Request>,
    },
    /// Create a new user liquidation auction. The bid and lot asset lists
    /// are consumed by v2 pool encoders and ignored by v1 encoders.
    NewLiquidationAuction {
        pool: String,
        user: String,
        percent: u64,
        bid: Vec<String>,
        lot: Vec<String>,
    },
    /// Create a new bad debt auction against the backstop
    NewBadDebtAuction { pool: String },
    /// Move a defaulted user's debt to the backstop
    BadDebtTransfer { pool: String, user: String },
}

/// The confirmed result of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub hash: String,
    pub ledger: u32,
    pub success: bool,
}

/// A pool lifecycle event observed on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEvent {
    pub ledger: u32,
    pub pool: String,
    pub kind: PoolEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEventKind {
    NewAuction {
        user: String,
        auction_type: u32,
        auction: AuctionData,
    },
    FillAuction {
        user: String,
        auction_type: u32,
        filler: String,
        fill_percent: u64,
    },
    DeleteAuction {
        user: String,
        auction_type: u32,
    },
    /// Supply, withdraw, borrow or repay touched this user's positions
    PositionUpdate {
        user: String,
    },
}

/// Read and submit access to the chain. One implementation per RPC backend;
/// tests use an in-memory mock.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_ledger(&self) -> Result<u32>;

    /// Pool events since (exclusive) the given ledger, in ledger order
    async fn events_since(&self, ledger: u32, pools: &[String]) -> Result<Vec<PoolEvent>>;

    async fn load_pool(&self, pool: &str) -> Result<Pool>;

    async fn load_oracle(&self, pool: &Pool) -> Result<PoolOracle>;

    async fn load_positions(&self, pool: &str, user: &str) -> Result<Option<Positions>>;

    async fn load_auction(
        &self,
        pool: &str,
        user: &str,
        auction_type: AuctionType,
    ) -> Result<Option<AuctionData>>;

    /// Token balance of an account, via read-only simulation
    async fn balance(&self, account: &str, asset: &str) -> Result<i128>;

    /// Simulate a single-sided withdrawal of backstop LP tokens to USDC.
    /// Returns None when the simulation cannot be performed.
    async fn simulate_backstop_withdrawal(&self, lp_amount: i128) -> Result<Option<i128>>;

    /// Spot price of the backstop LP token in USDC
    async fn backstop_token_spot_price(&self) -> Result<f64>;

    async fn submit(&self, tx: &TxRequest) -> Result<SubmitResult>;
}

/// Load an account's balances for a set of assets, fanning out simulations
/// in bounded batches. A failed lookup reads as a zero balance.
pub async fn load_balances(
    client: &dyn ChainClient,
    account: &str,
    assets: &[String],
) -> HashMap<String, i128> {
    let mut balances = HashMap::new();
    for chunk in assets.chunks(BALANCE_FAN_OUT) {
        let lookups = chunk.iter().map(|asset| client.balance(account, asset));
        let results = futures::future::join_all(lookups).await;
        for (asset, result) in chunk.iter().zip(results) {
            balances.insert(asset.clone(), result.unwrap_or(0));
        }
    }
    balances
}

/// An external price feed (exchange ticker or DEX path quote).
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<PriceEntry>>;
}

/// Operator notification sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, pool: &str, body: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AuctioneerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainClient for CountingClient {
        async fn latest_ledger(&self) -> Result<u32> {
            Ok(0)
        }
        async fn events_since(&self, _: u32, _: &[String]) -> Result<Vec<PoolEvent>> {
            Ok(vec![])
        }
        async fn load_pool(&self, pool: &str) -> Result<Pool> {
            Err(AuctioneerError::Rpc(pool.to_string()))
        }
        async fn load_oracle(&self, _: &Pool) -> Result<PoolOracle> {
            Err(AuctioneerError::Rpc("oracle".to_string()))
        }
        async fn load_positions(&self, _: &str, _: &str) -> Result<Option<Positions>> {
            Ok(None)
        }
        async fn load_auction(
            &self,
            _: &str,
            _: &str,
            _: AuctionType,
        ) -> Result<Option<AuctionData>> {
            Ok(None)
        }
        async fn balance(&self, _: &str, asset: &str) -> Result<i128> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if asset == "CFAIL" {
                Err(AuctioneerError::Rpc("boom".to_string()))
            } else {
                Ok(42)
            }
        }
        async fn simulate_backstop_withdrawal(&self, _: i128) -> Result<Option<i128>> {
            Ok(None)
        }
        async fn backstop_token_spot_price(&self) -> Result<f64> {
            Ok(0.5)
        }
        async fn submit(&self, _: &TxRequest) -> Result<SubmitResult> {
            Err(AuctioneerError::Rpc("submit".to_string()))
        }
    }

    #[tokio::test]
    async fn test_load_balances_fans_out_and_defaults_failures() {
        let client = CountingClient {
            calls: AtomicUsize::new(0),
        };
        let assets: Vec<String> = (0..7)
            .map(|i| format!("C{}", i))
            .chain(std::iter::once("CFAIL".to_string()))
            .collect();

        let balances = load_balances(&client, "GACCOUNT", &assets).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 8);
        assert_eq!(balances.len(), 8);
        assert_eq!(balances["C0"], 42);
        assert_eq!(balances["CFAIL"], 0);
    }
}
