use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::auctions::{
    plan_bad_debt_auction, plan_fill, plan_liquidation_auction, valuate, AuctionData, AuctionType,
    AuctionValue, FillPlan, FillerState, PrimaryConfig, ValuationContext,
};
use crate::backstop::lp_token_unit_price;
use crate::config::{AppConfig, Filler};
use crate::constants::{UNWIND_SUBMISSION_RETRIES, USER_PURGE_LEDGERS, WORK_SUBMISSION_RETRIES};
use crate::dependencies::{
    load_balances, ChainClient, NotificationSink, PoolEvent, PoolEventKind, PriceSource, TxRequest,
};
use crate::errors::{AuctioneerError, Result};
use crate::events::{dispatch_with_retry, DeadLetterLog, WorkerEvent};
use crate::oracle::{PoolOracle, PriceHistory};
use crate::pool::{Pool, PositionEstimate};
use crate::queue::{SubmissionHandler, SubmissionKind, SubmissionQueue};
use crate::storage::{AuctionEntry, Database, FilledAuctionEntry, UserEntry};

/// The decision engine process. Owns both submission queues and handles
/// every worker event; one instance per bot deployment.
pub struct Worker {
    pub config: AppConfig,
    chain: Arc<dyn ChainClient>,
    db: Arc<dyn Database>,
    sink: Arc<dyn NotificationSink>,
    sources: Vec<Arc<dyn PriceSource>>,
    pub work_queue: SubmissionQueue,
    pub bid_queue: SubmissionQueue,
    price_history: Mutex<HashMap<String, PriceHistory>>,
    dead_letter: DeadLetterLog,
}

impl Worker {
    pub fn new(
        config: AppConfig,
        chain: Arc<dyn ChainClient>,
        db: Arc<dyn Database>,
        sink: Arc<dyn NotificationSink>,
        sources: Vec<Arc<dyn PriceSource>>,
        dead_letter: DeadLetterLog,
    ) -> Self {
        Worker {
            config,
            chain,
            db,
            sink,
            sources,
            work_queue: SubmissionQueue::new(),
            bid_queue: SubmissionQueue::new(),
            price_history: Mutex::new(HashMap::new()),
            dead_letter,
        }
    }

    /// Process one event. Pool validation failures are fatal and propagate;
    /// all other failures retry and then dead-letter without stopping the
    /// worker.
    pub async fn process_event(&self, event: WorkerEvent) -> Result<()> {
        if event == WorkerEvent::ValidatePools {
            return self.validate_pools().await;
        }
        let result = dispatch_with_retry(&event, &self.dead_letter, || {
            let event = event.clone();
            async move { self.handle_event(&event).await }
        })
        .await;
        if let Err(ref failure) = result {
            error!(?event, %failure, "event dead-lettered");
            self.sink
                .notify("Event failed", "-", &failure.to_string())
                .await;
        }
        Ok(())
    }

    async fn handle_event(&self, event: &WorkerEvent) -> Result<()> {
        match event {
            WorkerEvent::ValidatePools => self.validate_pools().await,
            WorkerEvent::PriceUpdate => self.update_prices().await,
            WorkerEvent::OracleScan { pool } => self.oracle_scan(pool).await,
            WorkerEvent::LiqScan { pool } => self.liquidation_scan(pool).await,
            WorkerEvent::UserRefresh { cutoff_ledger } => self.refresh_users(*cutoff_ledger).await,
            WorkerEvent::CheckUser { pool, user } => self.check_user(pool, user).await,
            WorkerEvent::Chain { event } => self.handle_chain_event(event).await,
        }
    }

    /// Assert every configured pool reports the expected backstop.
    async fn validate_pools(&self) -> Result<()> {
        for entry in self.config.pool_configs.iter() {
            let pool = self.chain.load_pool(&entry.pool_address).await?;
            if pool.backstop != self.config.backstop_address {
                return Err(AuctioneerError::PoolValidation(format!(
                    "pool {} reports backstop {}, expected {}",
                    entry.pool_address, pool.backstop, self.config.backstop_address
                )));
            }
            info!(pool = %entry.pool_address, "pool validated");
        }
        Ok(())
    }

    /// Refresh the price table from every configured source. Sources run in
    /// parallel and individual failures are logged and swallowed.
    async fn update_prices(&self) -> Result<()> {
        let fetches = self.sources.iter().map(|source| source.fetch());
        let results = futures::future::join_all(fetches).await;
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(entries) => {
                    for entry in entries.iter() {
                        self.db.set_price(entry).await?;
                    }
                    info!(source = source.name(), count = entries.len(), "prices updated");
                }
                Err(failure) => {
                    warn!(source = source.name(), %failure, "price source failed");
                }
            }
        }
        Ok(())
    }

    /// Check only the users a significant oracle move could have affected:
    /// borrowers of an asset that went up, or holders of collateral that
    /// went down.
    async fn oracle_scan(&self, pool_address: &str) -> Result<()> {
        let pool = self.chain.load_pool(pool_address).await?;
        let oracle = self.chain.load_oracle(&pool).await?;
        let changes = self
            .price_history
            .lock()
            .unwrap()
            .entry(pool_address.to_string())
            .or_default()
            .update(&oracle);
        if changes.is_empty() {
            return Ok(());
        }

        let up_indexes: Vec<u32> = indexes_of(&pool, &changes.up);
        let down_indexes: Vec<u32> = indexes_of(&pool, &changes.down);
        let ledger = self.chain.latest_ledger().await?;
        for user in self.db.users(pool_address).await? {
            let affected = user
                .positions
                .liabilities
                .keys()
                .any(|i| up_indexes.contains(i))
                || user
                    .positions
                    .collateral
                    .keys()
                    .any(|i| down_indexes.contains(i));
            if affected {
                self.review_user(&pool, &oracle, &user, ledger).await?;
            }
        }
        Ok(())
    }

    /// Exhaustive liquidatability pass over every tracked user of a pool.
    async fn liquidation_scan(&self, pool_address: &str) -> Result<()> {
        let pool = self.chain.load_pool(pool_address).await?;
        let oracle = self.chain.load_oracle(&pool).await?;
        let ledger = self.chain.latest_ledger().await?;
        for user in self.db.users(pool_address).await? {
            self.review_user(&pool, &oracle, &user, ledger).await?;
        }
        Ok(())
    }

    /// Evaluate one user's stored positions and enqueue whatever work they
    /// warrant: a liquidation auction, a bad debt transfer, or a bad debt
    /// auction when the user is the backstop itself.
    async fn review_user(
        &self,
        pool: &Pool,
        oracle: &PoolOracle,
        user: &UserEntry,
        ledger: u32,
    ) -> Result<()> {
        let estimate = match PositionEstimate::from_positions(pool, oracle, &user.positions) {
            Ok(estimate) => estimate,
            Err(failure) => {
                warn!(user = %user.user_id, %failure, "skipping user estimate");
                return Ok(());
            }
        };

        if user.user_id == pool.backstop {
            if estimate.is_bad_debt()
                && self
                    .db
                    .get_auction(&pool.address, &user.user_id, AuctionType::BadDebt.as_u32())
                    .await?
                    .is_none()
            {
                if let Some(proposal) = plan_bad_debt_auction(
                    pool,
                    oracle,
                    &user.positions,
                    &self.config.backstop_token_address,
                )? {
                    self.enqueue_work(SubmissionKind::AuctionCreation {
                        pool: pool.address.clone(),
                        user: user.user_id.clone(),
                        auction_type: AuctionType::BadDebt.as_u32(),
                        percent: proposal.percent,
                        bid: proposal.bid,
                        lot: proposal.lot,
                    });
                }
            }
            return Ok(());
        }

        if estimate.is_bad_debt() {
            self.enqueue_work(SubmissionKind::BadDebtTransfer {
                pool: pool.address.clone(),
                user: user.user_id.clone(),
            });
        } else if estimate.is_liquidatable()
            && self
                .db
                .get_auction(
                    &pool.address,
                    &user.user_id,
                    AuctionType::Liquidation.as_u32(),
                )
                .await?
                .is_none()
        {
            if let Some(proposal) = plan_liquidation_auction(pool, oracle, &user.positions)? {
                self.enqueue_work(SubmissionKind::AuctionCreation {
                    pool: pool.address.clone(),
                    user: user.user_id.clone(),
                    auction_type: AuctionType::Liquidation.as_u32(),
                    percent: proposal.percent,
                    bid: proposal.bid,
                    lot: proposal.lot,
                });
            }
        }

        let mut updated = user.clone();
        updated.health_factor = estimate.as_health_factor();
        updated.updated = ledger;
        self.db.set_user(&updated).await
    }

    fn enqueue_work(&self, kind: SubmissionKind) {
        let user = match &kind {
            SubmissionKind::AuctionCreation { user, .. }
            | SubmissionKind::BadDebtTransfer { user, .. } => user.clone(),
            _ => return,
        };
        if self.work_queue.contains_user_work(kind.pool(), &user) {
            return;
        }
        info!("enqueueing work: {}", kind.describe());
        self.work_queue
            .add_submission(kind, WORK_SUBMISSION_RETRIES, 0);
    }

    /// Reload users whose estimates have gone stale; purge users whose pool
    /// is no longer configured or who have not been seen for a long time.
    async fn refresh_users(&self, cutoff_ledger: u32) -> Result<()> {
        let mut pools: HashMap<String, (Pool, PoolOracle)> = HashMap::new();
        for user in self.db.all_users().await? {
            if self.config.pool(&user.pool_id).is_none()
                || user.updated + USER_PURGE_LEDGERS < cutoff_ledger
            {
                self.db.remove_user(&user.pool_id, &user.user_id).await?;
                continue;
            }
            if user.updated >= cutoff_ledger {
                continue;
            }
            if !pools.contains_key(&user.pool_id) {
                let pool = self.chain.load_pool(&user.pool_id).await?;
                let oracle = self.chain.load_oracle(&pool).await?;
                pools.insert(user.pool_id.clone(), (pool, oracle));
            }
            let (pool, oracle) = pools.get(&user.pool_id).unwrap();
            match self.chain.load_positions(&user.pool_id, &user.user_id).await? {
                Some(positions) => {
                    let ledger = self.chain.latest_ledger().await?;
                    let mut fresh = user.clone();
                    fresh.positions = positions;
                    self.review_user(pool, oracle, &fresh, ledger).await?;
                }
                None => self.db.remove_user(&user.pool_id, &user.user_id).await?,
            }
        }
        Ok(())
    }

    /// Reload a single user from the chain and re-evaluate them.
    async fn check_user(&self, pool_address: &str, user_id: &str) -> Result<()> {
        let pool = self.chain.load_pool(pool_address).await?;
        let oracle = self.chain.load_oracle(&pool).await?;
        match self.chain.load_positions(pool_address, user_id).await? {
            Some(positions) => {
                let ledger = self.chain.latest_ledger().await?;
                let entry = UserEntry {
                    pool_id: pool_address.to_string(),
                    user_id: user_id.to_string(),
                    health_factor: 0.0,
                    positions,
                    updated: ledger,
                };
                self.review_user(&pool, &oracle, &entry, ledger).await
            }
            None => self.db.remove_user(pool_address, user_id).await,
        }
    }

    /// Track auction lifecycle events forwarded by the collector.
    async fn handle_chain_event(&self, event: &PoolEvent) -> Result<()> {
        match &event.kind {
            PoolEventKind::NewAuction {
                user,
                auction_type,
                auction,
            } => {
                let filler = self
                    .config
                    .fillers
                    .iter()
                    .find(|f| f.supports(&auction.bid.assets(), &auction.lot.assets()));
                match filler {
                    Some(filler) => {
                        let entry = AuctionEntry {
                            pool_id: event.pool.clone(),
                            user_id: user.clone(),
                            auction_type: *auction_type,
                            filler: filler_public_key(filler)?,
                            start_block: auction.block,
                            fill_block: 0,
                            updated: event.ledger,
                        };
                        info!(pool = %event.pool, user = %user, auction_type, "tracking new auction");
                        self.db.set_auction(&entry).await
                    }
                    None => {
                        info!(pool = %event.pool, user = %user, "no filler supports auction");
                        Ok(())
                    }
                }
            }
            PoolEventKind::FillAuction {
                user,
                auction_type,
                fill_percent,
                ..
            } => {
                if *fill_percent >= 100 {
                    self.db
                        .remove_auction(&event.pool, user, *auction_type)
                        .await
                } else if let Some(mut entry) = self
                    .db
                    .get_auction(&event.pool, user, *auction_type)
                    .await?
                {
                    // partially filled on chain. force a fresh planning pass
                    entry.fill_block = 0;
                    entry.updated = event.ledger;
                    self.db.set_auction(&entry).await
                } else {
                    Ok(())
                }
            }
            PoolEventKind::DeleteAuction { user, auction_type } => {
                self.db
                    .remove_auction(&event.pool, user, *auction_type)
                    .await
            }
            PoolEventKind::PositionUpdate { user } => self.check_user(&event.pool, user).await,
        }
    }

    /********** Submission execution **********/

    async fn execute_bid(&self, filler_name: &str, entry: &AuctionEntry) -> Result<bool> {
        let filler = self.filler_by_name(filler_name)?;
        let planned = match plan_entry_fill(
            self.chain.as_ref(),
            &self.config,
            self.db.as_ref(),
            filler,
            entry,
        )
        .await
        {
            Ok(planned) => planned,
            Err(AuctioneerError::InfeasibleFill) => {
                info!("no feasible fill for {}", entry.user_id);
                return Ok(true);
            }
            Err(failure) => return Err(failure),
        };
        let planned = match planned {
            Some(planned) => planned,
            None => {
                // the auction no longer exists on chain
                self.db
                    .remove_auction(&entry.pool_id, &entry.user_id, entry.auction_type)
                    .await?;
                return Ok(true);
            }
        };

        let next_ledger = self.chain.latest_ledger().await? + 1;
        if planned.plan.fill_block > next_ledger {
            // not ready yet; persist the re-planned block for the bidder
            let mut updated = entry.clone();
            updated.fill_block = planned.plan.fill_block;
            updated.updated = next_ledger - 1;
            self.db.set_auction(&updated).await?;
            return Ok(true);
        }

        let filler_key = filler_public_key(filler)?;
        let result = self
            .chain
            .submit(&TxRequest::SubmitRequests {
                pool: entry.pool_id.clone(),
                filler: filler_key.clone(),
                requests: planned.plan.requests.clone(),
            })
            .await?;
        if !result.success {
            return Ok(false);
        }

        let (scaled, remaining) = planned.auction.scale(result.ledger, planned.plan.percent);
        let est_profit = planned.plan.lot_value - planned.plan.bid_value;
        self.db
            .add_filled_auction(&FilledAuctionEntry {
                tx_hash: result.hash.clone(),
                pool_id: entry.pool_id.clone(),
                user_id: entry.user_id.clone(),
                auction_type: entry.auction_type,
                filler: filler_key,
                bid: scaled.bid.iter().map(|(a, v)| (a.clone(), v)).collect(),
                lot: scaled.lot.iter().map(|(a, v)| (a.clone(), v)).collect(),
                est_profit,
                fill_block: result.ledger,
                timestamp: now_secs(),
            })
            .await?;
        if remaining.is_none() {
            self.db
                .remove_auction(&entry.pool_id, &entry.user_id, entry.auction_type)
                .await?;
        } else {
            let mut updated = entry.clone();
            updated.fill_block = 0;
            updated.updated = result.ledger;
            self.db.set_auction(&updated).await?;
        }

        // restore filler health once the fill settles
        self.bid_queue.add_submission(
            SubmissionKind::Unwind {
                filler: filler_name.to_string(),
                pool: entry.pool_id.clone(),
            },
            UNWIND_SUBMISSION_RETRIES,
            1000,
        );
        self.sink
            .notify(
                "Filled auction",
                &entry.pool_id,
                &format!(
                    "user {} type {} at {}% for an estimated profit of {:.2}",
                    entry.user_id, entry.auction_type, planned.plan.percent, est_profit
                ),
            )
            .await;
        Ok(true)
    }

    async fn execute_unwind(&self, filler_name: &str, pool_address: &str) -> Result<bool> {
        let filler = self.filler_by_name(filler_name)?;
        let filler_key = filler_public_key(filler)?;
        let pool = self.chain.load_pool(pool_address).await?;
        let oracle = self.chain.load_oracle(&pool).await?;
        let positions = match self.chain.load_positions(pool_address, &filler_key).await? {
            Some(positions) if !positions.is_empty() => positions,
            _ => return Ok(true),
        };
        let balances = load_balances(self.chain.as_ref(), &filler_key, &pool.reserve_list).await;
        let primary = resolve_primary(&self.config, filler, pool_address);
        let requests = crate::position_manager::manage_positions(
            filler,
            &pool,
            &oracle,
            primary.as_ref(),
            &positions,
            &balances,
        )?;
        if requests.is_empty() {
            return Ok(true);
        }
        let result = self
            .chain
            .submit(&TxRequest::SubmitRequests {
                pool: pool_address.to_string(),
                filler: filler_key,
                requests,
            })
            .await?;
        Ok(result.success)
    }

    async fn execute_creation(
        &self,
        pool: &str,
        user: &str,
        auction_type: u32,
        percent: u64,
        bid: &[String],
        lot: &[String],
    ) -> Result<bool> {
        let tx = match AuctionType::from_u32(auction_type) {
            AuctionType::Liquidation => TxRequest::NewLiquidationAuction {
                pool: pool.to_string(),
                user: user.to_string(),
                percent,
                bid: bid.to_vec(),
                lot: lot.to_vec(),
            },
            AuctionType::BadDebt => TxRequest::NewBadDebtAuction {
                pool: pool.to_string(),
            },
            AuctionType::Interest => return Err(AuctioneerError::InvalidConfig(
                "interest auctions are created by the protocol".to_string(),
            )),
        };
        let result = self.chain.submit(&tx).await?;
        Ok(result.success)
    }

    fn filler_by_name(&self, name: &str) -> Result<&Filler> {
        self.config
            .fillers
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| AuctioneerError::InvalidConfig(format!("unknown filler {}", name)))
    }
}

#[async_trait]
impl SubmissionHandler for Worker {
    async fn submit(&self, kind: &SubmissionKind) -> Result<bool> {
        match kind {
            SubmissionKind::Bid { filler, entry } => self.execute_bid(filler, entry).await,
            SubmissionKind::Unwind { filler, pool } => self.execute_unwind(filler, pool).await,
            SubmissionKind::AuctionCreation {
                pool,
                user,
                auction_type,
                percent,
                bid,
                lot,
            } => {
                self.execute_creation(pool, user, *auction_type, *percent, bid, lot)
                    .await
            }
            SubmissionKind::BadDebtTransfer { pool, user } => {
                let result = self
                    .chain
                    .submit(&TxRequest::BadDebtTransfer {
                        pool: pool.clone(),
                        user: user.clone(),
                    })
                    .await?;
                Ok(result.success)
            }
        }
    }

    async fn on_drop(&self, kind: &SubmissionKind, reason: &str) {
        error!("submission dropped: {}: {}", kind.describe(), reason);
        self.sink
            .notify(
                "Dropped submission",
                kind.pool(),
                &format!("{}\n{}", kind.describe(), reason),
            )
            .await;
    }
}

/// Everything a completed planning pass knows about an auction.
pub struct PlannedEntry {
    pub plan: FillPlan,
    pub auction: AuctionData,
    pub value: AuctionValue,
}

/// Load everything needed to plan a fill for a tracked auction and run the
/// planner. Returns None when the auction no longer exists on chain.
pub async fn plan_entry_fill(
    chain: &dyn ChainClient,
    config: &AppConfig,
    db: &dyn Database,
    filler: &Filler,
    entry: &AuctionEntry,
) -> Result<Option<PlannedEntry>> {
    let auction_type = entry.auction_type();
    let auction = match chain
        .load_auction(&entry.pool_id, &entry.user_id, auction_type)
        .await?
    {
        Some(auction) => auction,
        None => return Ok(None),
    };
    let pool = chain.load_pool(&entry.pool_id).await?;
    let oracle = chain.load_oracle(&pool).await?;

    let backstop_token = config.backstop_token_address.as_str();
    let lp_amount = match auction_type {
        AuctionType::Interest => auction.bid.get(backstop_token).unwrap_or(0),
        AuctionType::BadDebt => auction.lot.get(backstop_token).unwrap_or(0),
        AuctionType::Liquidation => 0,
    };
    let lp_token_price = if lp_amount > 0 {
        lp_token_unit_price(chain, lp_amount).await?
    } else {
        0.0
    };

    let mut price_overrides = HashMap::new();
    for price in db.prices().await? {
        price_overrides.insert(price.asset_id.clone(), price.price);
    }

    let filler_key = filler_public_key(filler)?;
    let mut balance_assets = pool.reserve_list.clone();
    balance_assets.push(backstop_token.to_string());
    let balances = load_balances(chain, &filler_key, &balance_assets).await;
    let positions = chain
        .load_positions(&entry.pool_id, &filler_key)
        .await?
        .unwrap_or_default();
    let estimate = PositionEstimate::from_positions(&pool, &oracle, &positions)
        .unwrap_or_default();
    let state = FillerState {
        balances,
        positions,
        estimate,
    };

    let ctx = ValuationContext {
        pool: &pool,
        oracle: &oracle,
        backstop_token,
        lp_token_price,
        price_overrides: &price_overrides,
    };
    let value = valuate(auction_type, &auction, &ctx, &state.balances)?;
    let primary = resolve_primary(config, filler, &entry.pool_id);
    let next_ledger = chain.latest_ledger().await? + 1;
    let plan = plan_fill(
        filler,
        &config.profits,
        &pool,
        &oracle,
        primary.as_ref(),
        auction_type,
        &entry.user_id,
        &auction,
        &value,
        &state,
        next_ledger,
        backstop_token,
    )?;
    Ok(Some(PlannedEntry {
        plan,
        auction,
        value,
    }))
}

/// The primary-collateral config for a filler in a pool: the filler's own
/// override when present, the pool's defaults otherwise.
pub fn resolve_primary(
    config: &AppConfig,
    filler: &Filler,
    pool_address: &str,
) -> Option<PrimaryConfig> {
    if let Some(pool_config) = filler.pool_config(pool_address) {
        return Some(PrimaryConfig {
            asset: pool_config.primary_asset.clone(),
            min_collateral: pool_config.min_primary_collateral,
        });
    }
    config.pool(pool_address).map(|entry| PrimaryConfig {
        asset: entry.primary_asset.clone(),
        min_collateral: entry.min_primary_collateral,
    })
}

/// The strkey public key of a filler identity.
pub fn filler_public_key(filler: &Filler) -> Result<String> {
    let key = filler.signing_key()?;
    Ok(stellar_strkey::ed25519::PublicKey(key.verifying_key().to_bytes()).to_string())
}

/// The filler whose public key matches a tracked auction's assignment.
pub fn filler_by_public_key<'a>(config: &'a AppConfig, public_key: &str) -> Option<&'a Filler> {
    config
        .fillers
        .iter()
        .find(|f| filler_public_key(f).map(|k| k == public_key).unwrap_or(false))
}

/// Drive a worker from an event channel, with both queue dispatchers running
/// on the same task set.
pub async fn run(worker: Arc<Worker>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    let work_queue = worker.work_queue.clone();
    let bid_queue = worker.bid_queue.clone();
    let work_handler = worker.clone();
    let bid_handler = worker.clone();
    tokio::spawn(async move { work_queue.run(work_handler.as_ref()).await });
    tokio::spawn(async move { bid_queue.run(bid_handler.as_ref()).await });
    while let Some(event) = events.recv().await {
        if let Err(failure) = worker.process_event(event).await {
            error!(%failure, "fatal worker error");
            break;
        }
    }
}

fn indexes_of(pool: &Pool, assets: &std::collections::HashSet<String>) -> Vec<u32> {
    assets
        .iter()
        .filter_map(|asset| pool.reserves.get(asset).map(|r| r.index))
        .collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
