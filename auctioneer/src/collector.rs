use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::constants::{
    LIQ_SCAN_INTERVAL, ORACLE_SCAN_INTERVAL, PRICE_UPDATE_INTERVAL, USER_REFRESH_INTERVAL,
    USER_STALE_LEDGERS,
};
use crate::dependencies::ChainClient;
use crate::errors::Result;
use crate::events::WorkerEvent;
use crate::storage::Database;

/// Status row recording the last ledger the collector processed
const STATUS_NAME: &str = "collector";

/// Polls the chain for new ledgers, forwards pool lifecycle events to the
/// worker, ticks the bidder, and fans out periodic work on ledger cadences.
pub struct Collector {
    chain: Arc<dyn ChainClient>,
    db: Arc<dyn Database>,
    pools: Vec<String>,
    worker_tx: mpsc::UnboundedSender<WorkerEvent>,
    bidder_tx: mpsc::UnboundedSender<u32>,
    last_ledger: u32,
}

impl Collector {
    pub async fn new(
        chain: Arc<dyn ChainClient>,
        db: Arc<dyn Database>,
        pools: Vec<String>,
        worker_tx: mpsc::UnboundedSender<WorkerEvent>,
        bidder_tx: mpsc::UnboundedSender<u32>,
    ) -> Result<Self> {
        // resume from the last ledger seen before a restart
        let last_ledger = db.get_status(STATUS_NAME).await?.unwrap_or(0);
        Ok(Collector {
            chain,
            db,
            pools,
            worker_tx,
            bidder_tx,
            last_ledger,
        })
    }

    /// Process every ledger since the last poll. Within a ledger, pool
    /// events go out first, then periodic work events.
    pub async fn poll(&mut self) -> Result<()> {
        let latest = self.chain.latest_ledger().await?;
        if latest <= self.last_ledger {
            return Ok(());
        }
        let events = self
            .chain
            .events_since(self.last_ledger, &self.pools)
            .await?;

        for ledger in (self.last_ledger + 1)..=latest {
            let _ = self.bidder_tx.send(ledger);
            for event in events.iter().filter(|e| e.ledger == ledger) {
                let _ = self.worker_tx.send(WorkerEvent::Chain {
                    event: event.clone(),
                });
            }
            self.emit_periodic(ledger);
        }

        self.last_ledger = latest;
        self.db.set_status(STATUS_NAME, latest).await?;
        Ok(())
    }

    fn emit_periodic(&self, ledger: u32) {
        if ledger % ORACLE_SCAN_INTERVAL == 0 {
            for pool in self.pools.iter() {
                let _ = self.worker_tx.send(WorkerEvent::OracleScan {
                    pool: pool.clone(),
                });
            }
        }
        if ledger % PRICE_UPDATE_INTERVAL == 0 {
            let _ = self.worker_tx.send(WorkerEvent::PriceUpdate);
        }
        if ledger % LIQ_SCAN_INTERVAL == 0 {
            for pool in self.pools.iter() {
                let _ = self.worker_tx.send(WorkerEvent::LiqScan {
                    pool: pool.clone(),
                });
            }
        }
        if ledger % USER_REFRESH_INTERVAL == 0 {
            let _ = self.worker_tx.send(WorkerEvent::UserRefresh {
                cutoff_ledger: ledger.saturating_sub(USER_STALE_LEDGERS),
            });
        }
    }

    /// Poll loop. The chain produces a ledger roughly every five seconds;
    /// polling faster only burns RPC quota.
    pub async fn run(mut self, poll_interval: Duration) {
        info!(from = self.last_ledger, "collector started");
        loop {
            if let Err(failure) = self.poll().await {
                warn!(%failure, "collector poll failed");
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auctions::AuctionType;
    use crate::dependencies::{PoolEvent, PoolEventKind, SubmitResult, TxRequest};
    use crate::oracle::PoolOracle;
    use crate::pool::{Pool, Positions};
    use crate::storage::MemoryDatabase;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChain {
        latest: Mutex<u32>,
        events: Mutex<Vec<PoolEvent>>,
    }

    #[async_trait]
    impl ChainClient for ScriptedChain {
        async fn latest_ledger(&self) -> Result<u32> {
            Ok(*self.latest.lock().unwrap())
        }
        async fn events_since(&self, ledger: u32, _: &[String]) -> Result<Vec<PoolEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.ledger > ledger)
                .cloned()
                .collect())
        }
        async fn load_pool(&self, _: &str) -> Result<Pool> {
            unimplemented!()
        }
        async fn load_oracle(&self, _: &Pool) -> Result<PoolOracle> {
            unimplemented!()
        }
        async fn load_positions(&self, _: &str, _: &str) -> Result<Option<Positions>> {
            Ok(None)
        }
        async fn load_auction(
            &self,
            _: &str,
            _: &str,
            _: AuctionType,
        ) -> Result<Option<crate::auctions::AuctionData>> {
            Ok(None)
        }
        async fn balance(&self, _: &str, _: &str) -> Result<i128> {
            Ok(0)
        }
        async fn simulate_backstop_withdrawal(&self, _: i128) -> Result<Option<i128>> {
            Ok(None)
        }
        async fn backstop_token_spot_price(&self) -> Result<f64> {
            Ok(0.5)
        }
        async fn submit(&self, _: &TxRequest) -> Result<SubmitResult> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_poll_orders_events_before_periodic_work() {
        let chain = Arc::new(ScriptedChain {
            latest: Mutex::new(60),
            events: Mutex::new(vec![PoolEvent {
                ledger: 60,
                pool: "CPOOL".to_string(),
                kind: PoolEventKind::PositionUpdate {
                    user: "GUSER".to_string(),
                },
            }]),
        });
        let db = Arc::new(MemoryDatabase::new());
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let (bidder_tx, mut bidder_rx) = mpsc::unbounded_channel();
        let mut collector = Collector::new(
            chain.clone(),
            db.clone(),
            vec!["CPOOL".to_string()],
            worker_tx,
            bidder_tx,
        )
        .await
        .unwrap();
        collector.last_ledger = 59;

        collector.poll().await.unwrap();

        assert_eq!(bidder_rx.recv().await.unwrap(), 60);
        // ledger 60: the chain event precedes the periodic fan-out
        let first = worker_rx.recv().await.unwrap();
        assert!(matches!(first, WorkerEvent::Chain { .. }));
        let second = worker_rx.recv().await.unwrap();
        assert_eq!(
            second,
            WorkerEvent::OracleScan {
                pool: "CPOOL".to_string()
            }
        );
        let third = worker_rx.recv().await.unwrap();
        assert_eq!(third, WorkerEvent::PriceUpdate);
        // status row advanced for restart recovery
        assert_eq!(db.get_status("collector").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_poll_is_idempotent_when_no_new_ledger() {
        let chain = Arc::new(ScriptedChain {
            latest: Mutex::new(10),
            events: Mutex::new(vec![]),
        });
        let db = Arc::new(MemoryDatabase::new());
        db.set_status("collector", 10).await.unwrap();
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let (bidder_tx, mut bidder_rx) = mpsc::unbounded_channel();
        let mut collector = Collector::new(
            chain,
            db,
            vec!["CPOOL".to_string()],
            worker_tx,
            bidder_tx,
        )
        .await
        .unwrap();

        collector.poll().await.unwrap();
        assert!(worker_rx.try_recv().is_err());
        assert!(bidder_rx.try_recv().is_err());
    }
}
