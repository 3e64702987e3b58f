use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::{AuctioneerError, Result};

/// Number of prices retained per asset in the sliding window
const HISTORY_WINDOW: usize = 30;

/// Minimum relative move from the window median treated as significant
const SIGNIFICANT_MOVE: f64 = 0.01;

/// A snapshot of the pool's oracle prices, loaded fresh for each event.
#[derive(Debug, Clone)]
pub struct PoolOracle {
    pub decimals: u32,
    prices: HashMap<String, i128>,
}

impl PoolOracle {
    pub fn new(decimals: u32, prices: HashMap<String, i128>) -> Self {
        PoolOracle { decimals, prices }
    }

    /// The raw fixed-point price for an asset, in the oracle's decimals
    pub fn raw_price(&self, asset: &str) -> Result<i128> {
        self.prices
            .get(asset)
            .copied()
            .ok_or_else(|| AuctioneerError::MissingPrice(asset.to_string()))
    }

    /// The price for an asset as a float
    pub fn price(&self, asset: &str) -> Result<f64> {
        Ok(self.raw_price(asset)? as f64 / 10f64.powi(self.decimals as i32))
    }

    pub fn assets(&self) -> impl Iterator<Item = &String> {
        self.prices.keys()
    }
}

/// Assets whose latest price moved significantly, partitioned by direction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PriceChanges {
    pub up: HashSet<String>,
    pub down: HashSet<String>,
}

impl PriceChanges {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// A bounded sliding window of oracle prices per asset. Detecting directional
/// moves against the window median lets the worker scan only the users a move
/// could have made liquidatable, instead of every user every tick.
#[derive(Debug, Default)]
pub struct PriceHistory {
    history: HashMap<String, VecDeque<f64>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        PriceHistory {
            history: HashMap::new(),
        }
    }

    /// Record the latest oracle snapshot and report assets whose newest price
    /// differs from the window median by at least the significance threshold.
    pub fn update(&mut self, oracle: &PoolOracle) -> PriceChanges {
        let mut changes = PriceChanges::default();
        for asset in oracle.assets() {
            let price = match oracle.price(asset) {
                Ok(price) => price,
                Err(_) => continue,
            };
            let window = self.history.entry(asset.clone()).or_default();
            if window.len() >= 2 {
                let median = median(window);
                if median > 0.0 {
                    let move_pct = price / median - 1.0;
                    if move_pct >= SIGNIFICANT_MOVE {
                        changes.up.insert(asset.clone());
                    } else if move_pct <= -SIGNIFICANT_MOVE {
                        changes.down.insert(asset.clone());
                    }
                }
            }
            window.push_back(price);
            if window.len() > HISTORY_WINDOW {
                window.pop_front();
            }
        }
        changes
    }
}

fn median(window: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
