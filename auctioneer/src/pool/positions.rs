use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user's positions with a pool, keyed by reserve index and stored in the
/// reserve's share token units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positions {
    pub liabilities: BTreeMap<u32, i128>, // Map of Reserve Index to liability share balance
    pub collateral: BTreeMap<u32, i128>,  // Map of Reserve Index to collateral supply share balance
}

impl Positions {
    pub fn is_empty(&self) -> bool {
        self.liabilities.is_empty() && self.collateral.is_empty()
    }

    /// The number of unique reserves touched across both sides
    pub fn effective_count(&self) -> u32 {
        let mut indexes: Vec<u32> = self.collateral.keys().copied().collect();
        for index in self.liabilities.keys() {
            if !indexes.contains(index) {
                indexes.push(*index);
            }
        }
        indexes.len() as u32
    }

    pub fn get_collateral(&self, reserve_index: u32) -> i128 {
        self.collateral.get(&reserve_index).copied().unwrap_or(0)
    }

    pub fn get_liabilities(&self, reserve_index: u32) -> i128 {
        self.liabilities.get(&reserve_index).copied().unwrap_or(0)
    }

    /// Add collateral to the position expressed in blendTokens
    pub fn add_collateral(&mut self, reserve_index: u32, amount: i128) {
        let balance = self.get_collateral(reserve_index);
        self.collateral.insert(reserve_index, balance + amount);
    }

    /// Remove collateral from the position, dropping the entry at zero
    pub fn remove_collateral(&mut self, reserve_index: u32, amount: i128) {
        let new_balance = self.get_collateral(reserve_index) - amount;
        if new_balance <= 0 {
            self.collateral.remove(&reserve_index);
        } else {
            self.collateral.insert(reserve_index, new_balance);
        }
    }

    /// Add liabilities to the position expressed in debtTokens
    pub fn add_liabilities(&mut self, reserve_index: u32, amount: i128) {
        let balance = self.get_liabilities(reserve_index);
        self.liabilities.insert(reserve_index, balance + amount);
    }

    /// Remove liabilities from the position, dropping the entry at zero
    pub fn remove_liabilities(&mut self, reserve_index: u32, amount: i128) {
        let new_balance = self.get_liabilities(reserve_index) - amount;
        if new_balance <= 0 {
            self.liabilities.remove(&reserve_index);
        } else {
            self.liabilities.insert(reserve_index, new_balance);
        }
    }
}
