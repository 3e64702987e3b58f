use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::constants::BID_SUBMISSION_RETRIES;
use crate::dependencies::ChainClient;
use crate::errors::{AuctioneerError, Result};
use crate::queue::{SubmissionKind, SubmissionQueue};
use crate::storage::Database;
use crate::worker::{filler_by_public_key, plan_entry_fill};

/// Re-plan cadence: always re-plan within this many blocks of the fill
const REPLAN_NEAR_BLOCKS: i64 = 5;

/// Re-plan cadence: otherwise re-plan every this many blocks out
const REPLAN_EVERY_BLOCKS: i64 = 10;

/// Watches tracked auctions each ledger and turns due fills into bid
/// submissions.
pub struct Bidder {
    config: AppConfig,
    chain: Arc<dyn ChainClient>,
    db: Arc<dyn Database>,
    bid_queue: SubmissionQueue,
}

impl Bidder {
    pub fn new(
        config: AppConfig,
        chain: Arc<dyn ChainClient>,
        db: Arc<dyn Database>,
        bid_queue: SubmissionQueue,
    ) -> Self {
        Bidder {
            config,
            chain,
            db,
            bid_queue,
        }
    }

    /// Process one observed ledger: refresh fill blocks on the re-plan
    /// cadence and enqueue bids whose block has arrived.
    pub async fn handle_ledger(&self, ledger: u32) -> Result<()> {
        let next_ledger = ledger + 1;
        for mut entry in self.db.auctions().await? {
            if self.bid_queue.contains_auction(&entry) {
                continue;
            }

            let blocks_out = entry.fill_block as i64 - next_ledger as i64;
            let needs_plan = entry.fill_block == 0
                || blocks_out <= REPLAN_NEAR_BLOCKS
                || blocks_out % REPLAN_EVERY_BLOCKS == 0;
            if needs_plan {
                let filler = match filler_by_public_key(&self.config, &entry.filler) {
                    Some(filler) => filler,
                    None => {
                        warn!(filler = %entry.filler, "tracked auction has no configured filler");
                        continue;
                    }
                };
                match plan_entry_fill(
                    self.chain.as_ref(),
                    &self.config,
                    self.db.as_ref(),
                    filler,
                    &entry,
                )
                .await
                {
                    Ok(Some(planned)) => {
                        entry.fill_block = planned.plan.fill_block;
                        entry.updated = ledger;
                        self.db.set_auction(&entry).await?;
                    }
                    Ok(None) => {
                        info!(user = %entry.user_id, "auction vanished, dropping entry");
                        self.db
                            .remove_auction(&entry.pool_id, &entry.user_id, entry.auction_type)
                            .await?;
                        continue;
                    }
                    Err(AuctioneerError::InfeasibleFill) => {
                        // not actionable this tick
                        continue;
                    }
                    Err(failure) => {
                        warn!(user = %entry.user_id, %failure, "planning failed");
                        continue;
                    }
                }
            }

            if entry.fill_block != 0 && entry.fill_block <= next_ledger {
                let filler = match filler_by_public_key(&self.config, &entry.filler) {
                    Some(filler) => filler.name.clone(),
                    None => continue,
                };
                info!(user = %entry.user_id, fill_block = entry.fill_block, "enqueueing bid");
                self.bid_queue.add_submission(
                    SubmissionKind::Bid {
                        filler,
                        entry: entry.clone(),
                    },
                    BID_SUBMISSION_RETRIES,
                    0,
                );
            }
        }
        Ok(())
    }

    /// Drive the bidder from a channel of observed ledgers.
    pub async fn run(&self, mut ledgers: mpsc::UnboundedReceiver<u32>) {
        while let Some(ledger) = ledgers.recv().await {
            if let Err(failure) = self.handle_ledger(ledger).await {
                warn!(%failure, ledger, "ledger pass failed");
            }
        }
    }
}
