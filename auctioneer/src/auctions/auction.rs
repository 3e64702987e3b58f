use serde::{Deserialize, Serialize};
use soroban_fixed_point_math::FixedPoint;

use crate::constants::{AUCTION_DURATION_BLOCKS, AUCTION_NOMINAL_BLOCK, PER_BLOCK_SCALAR, SCALAR_7};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AuctionType {
    Liquidation = 0,
    BadDebt = 1,
    Interest = 2,
}

impl AuctionType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => AuctionType::Liquidation,
            1 => AuctionType::BadDebt,
            2 => AuctionType::Interest,
            _ => panic!("internal error"),
        }
    }

    pub fn as_u32(&self) -> u32 {
        *self as u32
    }
}

/// An insertion-ordered map of asset address to token amount. Iteration
/// order is observable in the requests the bot builds, so ordering must be
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmounts(Vec<(String, i128)>);

impl AssetAmounts {
    pub fn new() -> Self {
        AssetAmounts(Vec::new())
    }

    pub fn get(&self, asset: &str) -> Option<i128> {
        self.0
            .iter()
            .find(|(a, _)| a == asset)
            .map(|(_, amount)| *amount)
    }

    /// Insert or overwrite the amount for an asset, preserving its slot
    pub fn set(&mut self, asset: &str, amount: i128) {
        match self.0.iter_mut().find(|(a, _)| a == asset) {
            Some(entry) => entry.1 = amount,
            None => self.0.push((asset.to_string(), amount)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, i128)> {
        self.0.iter().map(|(asset, amount)| (asset, *amount))
    }

    pub fn assets(&self) -> Vec<String> {
        self.0.iter().map(|(asset, _)| asset.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, i128)> for AssetAmounts {
    fn from_iter<T: IntoIterator<Item = (String, i128)>>(iter: T) -> Self {
        let mut amounts = AssetAmounts::new();
        for (asset, amount) in iter {
            amounts.set(&asset, amount);
        }
        amounts
    }
}

/// An on-chain auction snapshot. Liquidation lots are bTokens and bids are
/// dTokens; interest lots are underlying and bids are backstop LP tokens;
/// bad debt lots are backstop LP tokens and bids are dTokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionData {
    pub bid: AssetAmounts,
    pub lot: AssetAmounts,
    pub block: u32,
}

impl AuctionData {
    pub fn new(block: u32) -> Self {
        AuctionData {
            bid: AssetAmounts::new(),
            lot: AssetAmounts::new(),
            block,
        }
    }

    /// Scale the auction to the amounts exchanged when `percent` of it is
    /// filled at `fill_block`.
    ///
    /// Returns (Scaled Auction, Remaining Auction) such that:
    /// - Scaled Auction is the auction data the fill settles
    /// - Remaining Auction is the leftover auction data, or None if the fill
    ///   consumes the whole auction
    pub fn scale(&self, fill_block: u32, percent: u64) -> (AuctionData, Option<AuctionData>) {
        let mut to_fill = AuctionData::new(self.block);
        let mut remaining = AuctionData::new(self.block);

        let (lot_modifier, bid_modifier) = block_modifiers(fill_block.saturating_sub(self.block));

        // scale the auction
        let percent_i128 = percent as i128 * 1_00000; // scale to decimal form in 7 decimals from percentage
        for (asset, amount) in self.bid.iter() {
            // apply percent scalar and store remainder to base auction
            // round up to avoid rounding exploits
            let to_fill_base = amount.fixed_mul_ceil(percent_i128, SCALAR_7).unwrap();
            let remaining_base = amount - to_fill_base;
            if remaining_base > 0 {
                remaining.bid.set(asset, remaining_base);
            }
            // apply block scalar to the fill side and don't store if 0
            let to_fill_scaled = to_fill_base.fixed_mul_ceil(bid_modifier, SCALAR_7).unwrap();
            if to_fill_scaled > 0 {
                to_fill.bid.set(asset, to_fill_scaled);
            }
        }
        for (asset, amount) in self.lot.iter() {
            // round down to avoid rounding exploits
            let to_fill_base = amount.fixed_mul_floor(percent_i128, SCALAR_7).unwrap();
            let remaining_base = amount - to_fill_base;
            if remaining_base > 0 {
                remaining.lot.set(asset, remaining_base);
            }
            let to_fill_scaled = to_fill_base
                .fixed_mul_floor(lot_modifier, SCALAR_7)
                .unwrap();
            if to_fill_scaled > 0 {
                to_fill.lot.set(asset, to_fill_scaled);
            }
        }

        if remaining.lot.is_empty() && remaining.bid.is_empty() {
            (to_fill, None)
        } else {
            (to_fill, Some(remaining))
        }
    }
}

/// The fixed-point (7 decimal) lot and bid modifiers after `block_dif` blocks.
pub fn block_modifiers(block_dif: u32) -> (i128, i128) {
    let block_dif = block_dif as i128;
    let bid_modifier: i128;
    let lot_modifier: i128;
    if block_dif > 200 {
        // lot 100%, bid scaling down from 100% to 0%
        lot_modifier = SCALAR_7;
        if block_dif < 400 {
            bid_modifier = SCALAR_7 - (block_dif - 200) * PER_BLOCK_SCALAR;
        } else {
            bid_modifier = 0;
        }
    } else {
        // lot scaling from 0% to 100%, bid 100%
        lot_modifier = block_dif * PER_BLOCK_SCALAR;
        bid_modifier = SCALAR_7;
    }
    (lot_modifier, bid_modifier)
}

/// The lot modifier after `delta` blocks, as a float
pub fn lot_scalar(delta: u32) -> f64 {
    (delta as f64 / AUCTION_NOMINAL_BLOCK as f64).clamp(0.0, 1.0)
}

/// The bid modifier after `delta` blocks, as a float
pub fn bid_scalar(delta: u32) -> f64 {
    let past_nominal = delta.saturating_sub(AUCTION_NOMINAL_BLOCK) as f64;
    (1.0 - past_nominal / (AUCTION_DURATION_BLOCKS - AUCTION_NOMINAL_BLOCK) as f64).clamp(0.0, 1.0)
}
