use std::collections::HashMap;

use auctioneer::config::{AppConfig, Filler, FillerPoolConfig, PoolConfigEntry};
use auctioneer::constants::SCALAR_7;
use auctioneer::{
    AssetAmounts, AuctionData, AuctionType, AuctionValue, FillerState, Pool, PoolOracle,
    PositionEstimate, Positions, PrimaryConfig, Reserve, ValuationContext,
};

pub const POOL: &str = "CPOOL";
pub const BACKSTOP: &str = "CBACKSTOP";
pub const BACKSTOP_LP: &str = "CLPTOKEN";
pub const XLM: &str = "CXLM";
pub const USDC: &str = "CUSDC";
pub const EURC: &str = "CEURC";
pub const AQUA: &str = "CAQUA";

/// A pool universe with the four assets the scenario suite trades:
/// XLM at 0.099, USDC at 0.9997, EURC at 1.0928, AQUA at 0.000641, with
/// AQUA carrying a zero collateral factor.
pub struct TestFixture {
    pub pool: Pool,
    pub oracle: PoolOracle,
    pub overrides: HashMap<String, f64>,
    pub lp_token_price: f64,
}

impl TestFixture {
    pub fn create() -> Self {
        let assets: [(&str, u32, u32, u32, i128, i128, i128); 4] = [
            // (asset, index, c_factor, l_factor, b_rate, d_rate, price)
            (XLM, 0, 0_9000000, 0_9000000, 1_005_000_000, 1_000_000_000, 0_0990000),
            (USDC, 1, 0_9500000, 0_9500000, 1_005_000_000, 1_000_000_000, 0_9997000),
            (EURC, 2, 0_9500000, 0_9500000, 1_005_000_000, 1_000_000_000, 1_0928000),
            (AQUA, 3, 0_0000000, 0_7000000, 1_000_000_000, 1_000_000_000, 0_0006410),
        ];
        let mut reserves = HashMap::new();
        let mut prices = HashMap::new();
        let mut reserve_list = vec![];
        for (asset, index, c_factor, l_factor, b_rate, d_rate, price) in assets {
            reserves.insert(
                asset.to_string(),
                Reserve {
                    asset: asset.to_string(),
                    index,
                    l_factor,
                    c_factor,
                    decimals: 7,
                    scalar: SCALAR_7,
                    b_rate,
                    d_rate,
                },
            );
            prices.insert(asset.to_string(), price);
            reserve_list.push(asset.to_string());
        }
        TestFixture {
            pool: Pool {
                address: POOL.to_string(),
                backstop: BACKSTOP.to_string(),
                oracle: "CORACLE".to_string(),
                max_positions: 6,
                reserve_list,
                reserves,
            },
            oracle: PoolOracle::new(7, prices),
            overrides: HashMap::new(),
            lp_token_price: 0.5011,
        }
    }

    pub fn valuation_ctx(&self) -> ValuationContext<'_> {
        ValuationContext {
            pool: &self.pool,
            oracle: &self.oracle,
            backstop_token: BACKSTOP_LP,
            lp_token_price: self.lp_token_price,
            price_overrides: &self.overrides,
        }
    }

    /// Value an auction against a filler's wallet with the fixture context
    pub fn valuate(
        &self,
        auction_type: AuctionType,
        auction: &AuctionData,
        balances: &HashMap<String, i128>,
    ) -> AuctionValue {
        auctioneer::valuate(auction_type, auction, &self.valuation_ctx(), balances).unwrap()
    }

    /// A filler with a 10% profit target and a 1.2 health factor floor
    pub fn filler(&self, force_fill: bool) -> Filler {
        Filler {
            name: "tower".to_string(),
            keypair: test_secret(7),
            default_profit_pct: 0.10,
            min_health_factor: 1.2,
            force_fill,
            supported_bid: vec![
                XLM.to_string(),
                USDC.to_string(),
                EURC.to_string(),
                AQUA.to_string(),
                BACKSTOP_LP.to_string(),
            ],
            supported_lot: vec![
                XLM.to_string(),
                USDC.to_string(),
                EURC.to_string(),
                AQUA.to_string(),
                BACKSTOP_LP.to_string(),
            ],
            supported_pools: vec![FillerPoolConfig {
                pool_address: POOL.to_string(),
                primary_asset: USDC.to_string(),
                min_primary_collateral: 500_0000000,
                min_health_factor: None,
                force_fill: None,
            }],
        }
    }

    /// An app config wrapping the fixture pool and a single filler
    pub fn app_config(&self, force_fill: bool) -> AppConfig {
        AppConfig {
            name: "scenario-bot".to_string(),
            rpc_url: "http://localhost:8000".to_string(),
            network_passphrase: "Test SDF Network ; September 2015".to_string(),
            backstop_token_address: BACKSTOP_LP.to_string(),
            backstop_address: BACKSTOP.to_string(),
            usdc_address: USDC.to_string(),
            blnd_address: "CBLND".to_string(),
            keypair: test_secret(1),
            fillers: vec![self.filler(force_fill)],
            pool_configs: vec![PoolConfigEntry {
                name: "fixed".to_string(),
                pool_address: POOL.to_string(),
                primary_asset: USDC.to_string(),
                min_primary_collateral: 500_0000000,
            }],
            horizon_url: None,
            price_sources: vec![],
            profits: vec![],
            slack_webhook: None,
            discord_webhook: None,
        }
    }

    pub fn primary(&self) -> PrimaryConfig {
        PrimaryConfig {
            asset: USDC.to_string(),
            min_collateral: 500_0000000,
        }
    }

    /// A filler state with explicit effective balances and wallet holdings
    pub fn filler_state(
        &self,
        collateral_base: f64,
        liability_base: f64,
        balances: Vec<(&str, i128)>,
    ) -> FillerState {
        FillerState {
            balances: balances
                .into_iter()
                .map(|(asset, amount)| (asset.to_string(), amount))
                .collect(),
            positions: Positions::default(),
            estimate: PositionEstimate {
                collateral_base,
                collateral_raw: collateral_base,
                liability_base,
                liability_raw: liability_base,
            },
        }
    }

    pub fn auction(
        &self,
        block: u32,
        lot: Vec<(&str, i128)>,
        bid: Vec<(&str, i128)>,
    ) -> AuctionData {
        AuctionData {
            lot: lot
                .into_iter()
                .map(|(asset, amount)| (asset.to_string(), amount))
                .collect::<AssetAmounts>(),
            bid: bid
                .into_iter()
                .map(|(asset, amount)| (asset.to_string(), amount))
                .collect::<AssetAmounts>(),
            block,
        }
    }
}

/// A deterministic throwaway secret key
pub fn test_secret(seed: u8) -> String {
    stellar_strkey::ed25519::PrivateKey([seed; 32]).to_string()
}
