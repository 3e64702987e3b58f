use std::collections::HashMap;

use crate::errors::{AuctioneerError, Result};

use super::reserve::Reserve;

/// A read-only snapshot of a pool, loaded fresh for each event.
#[derive(Debug, Clone)]
pub struct Pool {
    pub address: String,
    pub backstop: String,
    pub oracle: String,
    pub max_positions: u32,
    /// Reserve asset addresses ordered by reserve index
    pub reserve_list: Vec<String>,
    pub reserves: HashMap<String, Reserve>,
}

impl Pool {
    /// Fetch the reserve for an underlying asset
    pub fn reserve(&self, asset: &str) -> Result<&Reserve> {
        self.reserves
            .get(asset)
            .ok_or_else(|| AuctioneerError::MissingReserve(asset.to_string()))
    }

    /// Fetch the reserve at a reserve index
    pub fn reserve_by_index(&self, index: u32) -> Result<&Reserve> {
        let asset = self
            .reserve_list
            .get(index as usize)
            .ok_or_else(|| AuctioneerError::MissingReserve(format!("index {}", index)))?;
        self.reserve(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SCALAR_7;

    fn reserve(asset: &str, index: u32) -> Reserve {
        Reserve {
            asset: asset.to_string(),
            index,
            l_factor: 0_9000000,
            c_factor: 0_9000000,
            decimals: 7,
            scalar: SCALAR_7,
            d_rate: 1_000_000_000,
            b_rate: 1_000_000_000,
        }
    }

    #[test]
    fn test_reserve_lookup() {
        let mut reserves = HashMap::new();
        reserves.insert("CXLM".to_string(), reserve("CXLM", 0));
        reserves.insert("CUSDC".to_string(), reserve("CUSDC", 1));
        let pool = Pool {
            address: "CPOOL".to_string(),
            backstop: "CBACKSTOP".to_string(),
            oracle: "CORACLE".to_string(),
            max_positions: 4,
            reserve_list: vec!["CXLM".to_string(), "CUSDC".to_string()],
            reserves,
        };

        assert_eq!(pool.reserve("CUSDC").unwrap().index, 1);
        assert_eq!(pool.reserve_by_index(0).unwrap().asset, "CXLM");
        assert!(matches!(
            pool.reserve("CEURC"),
            Err(AuctioneerError::MissingReserve(_))
        ));
        assert!(pool.reserve_by_index(7).is_err());
    }
}
