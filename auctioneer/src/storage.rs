use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auctions::AuctionType;
use crate::errors::Result;
use crate::pool::Positions;

/// A tracked live auction. Created on a new-auction event, re-planned by the
/// bidder, and deleted once the auction fills or vanishes on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionEntry {
    pub pool_id: String,
    pub user_id: String,
    pub auction_type: u32,
    /// Public key of the filler assigned to this auction
    pub filler: String,
    pub start_block: u32,
    /// 0 until the first planning pass runs
    pub fill_block: u32,
    pub updated: u32,
}

impl AuctionEntry {
    pub fn auction_type(&self) -> AuctionType {
        AuctionType::from_u32(self.auction_type)
    }
}

/// An immutable record of a completed bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledAuctionEntry {
    pub tx_hash: String,
    pub pool_id: String,
    pub user_id: String,
    pub auction_type: u32,
    pub filler: String,
    pub bid: Vec<(String, i128)>,
    pub lot: Vec<(String, i128)>,
    pub est_profit: f64,
    pub fill_block: u32,
    pub timestamp: u64,
}

/// The last-known positions of a borrower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub pool_id: String,
    pub user_id: String,
    pub health_factor: f64,
    pub positions: Positions,
    pub updated: u32,
}

/// An externally sourced price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub asset_id: String,
    pub price: f64,
    pub timestamp: u64,
}

/// Persistence behind the worker and bidder. Implementations must provide
/// per-row atomic upsert and delete, with `(pool, user, auction_type)`
/// uniqueness for auctions and `(pool, user)` uniqueness for users.
#[async_trait]
pub trait Database: Send + Sync {
    async fn set_auction(&self, entry: &AuctionEntry) -> Result<()>;
    async fn get_auction(
        &self,
        pool_id: &str,
        user_id: &str,
        auction_type: u32,
    ) -> Result<Option<AuctionEntry>>;
    async fn auctions(&self) -> Result<Vec<AuctionEntry>>;
    async fn remove_auction(&self, pool_id: &str, user_id: &str, auction_type: u32) -> Result<()>;

    async fn add_filled_auction(&self, entry: &FilledAuctionEntry) -> Result<()>;

    async fn set_user(&self, entry: &UserEntry) -> Result<()>;
    async fn get_user(&self, pool_id: &str, user_id: &str) -> Result<Option<UserEntry>>;
    async fn users(&self, pool_id: &str) -> Result<Vec<UserEntry>>;
    async fn all_users(&self) -> Result<Vec<UserEntry>>;
    async fn remove_user(&self, pool_id: &str, user_id: &str) -> Result<()>;

    async fn set_price(&self, entry: &PriceEntry) -> Result<()>;
    async fn prices(&self) -> Result<Vec<PriceEntry>>;

    async fn set_status(&self, name: &str, latest_ledger: u32) -> Result<()>;
    async fn get_status(&self, name: &str) -> Result<Option<u32>>;
}

/// An in-process store. Backs tests and single-host deployments; the trait
/// boundary keeps a relational store drop-in.
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    auctions: HashMap<(String, String, u32), AuctionEntry>,
    filled: Vec<FilledAuctionEntry>,
    users: HashMap<(String, String), UserEntry>,
    prices: HashMap<String, PriceEntry>,
    status: HashMap<String, u32>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        MemoryDatabase::default()
    }

    pub fn filled_auctions(&self) -> Vec<FilledAuctionEntry> {
        self.inner.lock().unwrap().filled.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn set_auction(&self, entry: &AuctionEntry) -> Result<()> {
        self.inner.lock().unwrap().auctions.insert(
            (
                entry.pool_id.clone(),
                entry.user_id.clone(),
                entry.auction_type,
            ),
            entry.clone(),
        );
        Ok(())
    }

    async fn get_auction(
        &self,
        pool_id: &str,
        user_id: &str,
        auction_type: u32,
    ) -> Result<Option<AuctionEntry>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .auctions
            .get(&(pool_id.to_string(), user_id.to_string(), auction_type))
            .cloned())
    }

    async fn auctions(&self) -> Result<Vec<AuctionEntry>> {
        let mut entries: Vec<AuctionEntry> =
            self.inner.lock().unwrap().auctions.values().cloned().collect();
        entries.sort_by(|a, b| {
            (&a.pool_id, &a.user_id, a.auction_type).cmp(&(&b.pool_id, &b.user_id, b.auction_type))
        });
        Ok(entries)
    }

    async fn remove_auction(&self, pool_id: &str, user_id: &str, auction_type: u32) -> Result<()> {
        self.inner.lock().unwrap().auctions.remove(&(
            pool_id.to_string(),
            user_id.to_string(),
            auction_type,
        ));
        Ok(())
    }

    async fn add_filled_auction(&self, entry: &FilledAuctionEntry) -> Result<()> {
        self.inner.lock().unwrap().filled.push(entry.clone());
        Ok(())
    }

    async fn set_user(&self, entry: &UserEntry) -> Result<()> {
        self.inner.lock().unwrap().users.insert(
            (entry.pool_id.clone(), entry.user_id.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn get_user(&self, pool_id: &str, user_id: &str) -> Result<Option<UserEntry>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .get(&(pool_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn users(&self, pool_id: &str) -> Result<Vec<UserEntry>> {
        let mut entries: Vec<UserEntry> = self
            .inner
            .lock()
            .unwrap()
            .users
            .values()
            .filter(|u| u.pool_id == pool_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(entries)
    }

    async fn all_users(&self) -> Result<Vec<UserEntry>> {
        let mut entries: Vec<UserEntry> =
            self.inner.lock().unwrap().users.values().cloned().collect();
        entries.sort_by(|a, b| (&a.pool_id, &a.user_id).cmp(&(&b.pool_id, &b.user_id)));
        Ok(entries)
    }

    async fn remove_user(&self, pool_id: &str, user_id: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .users
            .remove(&(pool_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn set_price(&self, entry: &PriceEntry) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .prices
            .insert(entry.asset_id.clone(), entry.clone());
        Ok(())
    }

    async fn prices(&self) -> Result<Vec<PriceEntry>> {
        Ok(self.inner.lock().unwrap().prices.values().cloned().collect())
    }

    async fn set_status(&self, name: &str, latest_ledger: u32) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .status
            .insert(name.to_string(), latest_ledger);
        Ok(())
    }

    async fn get_status(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.inner.lock().unwrap().status.get(name).copied())
    }
}
