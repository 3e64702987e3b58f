use std::collections::HashSet;
use std::path::Path;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Deserializer};

use crate::errors::{AuctioneerError, Result};

/// Top level bot configuration, loaded once at startup from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub name: String,
    #[serde(rename = "rpcURL")]
    pub rpc_url: String,
    pub network_passphrase: String,
    pub backstop_token_address: String,
    pub backstop_address: String,
    pub usdc_address: String,
    pub blnd_address: String,
    /// Operator secret, decoded into a signing key with `signing_key`
    pub keypair: String,
    pub fillers: Vec<Filler>,
    pub pool_configs: Vec<PoolConfigEntry>,
    #[serde(rename = "horizonURL", default)]
    pub horizon_url: Option<String>,
    #[serde(default)]
    pub price_sources: Vec<PriceSourceConfig>,
    #[serde(default)]
    pub profits: Vec<AuctionProfit>,
    #[serde(default)]
    pub slack_webhook: Option<String>,
    #[serde(default)]
    pub discord_webhook: Option<String>,
}

/// A bot identity that bids on auctions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filler {
    pub name: String,
    pub keypair: String,
    /// Required profit as a ratio of the bid taken on, in [0, 1]
    pub default_profit_pct: f64,
    /// Health factor floor maintained while holding auction proceeds, > 1
    pub min_health_factor: f64,
    /// Caps the fill delay independently of the profit target
    pub force_fill: bool,
    pub supported_bid: Vec<String>,
    pub supported_lot: Vec<String>,
    #[serde(default)]
    pub supported_pools: Vec<FillerPoolConfig>,
}

/// Per-pool overrides for a filler.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillerPoolConfig {
    pub pool_address: String,
    pub primary_asset: String,
    #[serde(deserialize_with = "i128_from_string")]
    pub min_primary_collateral: i128,
    #[serde(default)]
    pub min_health_factor: Option<f64>,
    #[serde(default)]
    pub force_fill: Option<bool>,
}

/// A tracked pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfigEntry {
    pub name: String,
    pub pool_address: String,
    pub primary_asset: String,
    #[serde(deserialize_with = "i128_from_string")]
    pub min_primary_collateral: i128,
}

/// Profit override applied to auctions whose bid and lot assets are covered
/// by the entry's supported sets. First match wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionProfit {
    pub profit_pct: f64,
    pub supported_bid: Vec<String>,
    pub supported_lot: Vec<String>,
}

/// A configured exchange or DEX price source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PriceSourceConfig {
    Coinbase {
        symbols: Vec<SymbolMapping>,
    },
    Binance {
        symbols: Vec<SymbolMapping>,
    },
    /// Symbols and the quote asset are in Horizon `CODE:ISSUER` form
    #[serde(rename_all = "camelCase")]
    Dex {
        symbols: Vec<SymbolMapping>,
        quote_asset: String,
    },
}

/// Maps an exchange ticker symbol to the on-chain asset it prices.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMapping {
    pub symbol: String,
    pub asset_id: String,
}

impl AppConfig {
    /// Load and validate the configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Decode the operator keypair into a signing key.
    pub fn signing_key(&self) -> Result<SigningKey> {
        decode_secret(&self.keypair)
    }

    pub fn pool(&self, pool_address: &str) -> Option<&PoolConfigEntry> {
        self.pool_configs
            .iter()
            .find(|p| p.pool_address == pool_address)
    }

    fn validate(&self) -> Result<()> {
        if self.pool_configs.is_empty() {
            return Err(AuctioneerError::InvalidConfig(
                "at least one pool config is required".to_string(),
            ));
        }
        if self.fillers.is_empty() {
            return Err(AuctioneerError::InvalidConfig(
                "at least one filler is required".to_string(),
            ));
        }
        self.signing_key()?;
        for filler in self.fillers.iter() {
            filler.validate()?;
        }
        Ok(())
    }
}

impl Filler {
    /// Decode the filler keypair into a signing key.
    pub fn signing_key(&self) -> Result<SigningKey> {
        decode_secret(&self.keypair)
    }

    /// Whether this filler can take on every asset the auction touches.
    pub fn supports(&self, bid_assets: &[String], lot_assets: &[String]) -> bool {
        let bid: HashSet<&str> = self.supported_bid.iter().map(String::as_str).collect();
        let lot: HashSet<&str> = self.supported_lot.iter().map(String::as_str).collect();
        bid_assets.iter().all(|a| bid.contains(a.as_str()))
            && lot_assets.iter().all(|a| lot.contains(a.as_str()))
    }

    /// The per-pool config for a pool, if the filler carries an override.
    pub fn pool_config(&self, pool_address: &str) -> Option<&FillerPoolConfig> {
        self.supported_pools
            .iter()
            .find(|p| p.pool_address == pool_address)
    }

    /// Health factor floor for the pool, falling back to the filler default.
    pub fn min_health_factor(&self, pool_address: &str) -> f64 {
        self.pool_config(pool_address)
            .and_then(|p| p.min_health_factor)
            .unwrap_or(self.min_health_factor)
    }

    /// Force-fill flag for the pool, falling back to the filler default.
    pub fn force_fill(&self, pool_address: &str) -> bool {
        self.pool_config(pool_address)
            .and_then(|p| p.force_fill)
            .unwrap_or(self.force_fill)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_profit_pct) {
            return Err(AuctioneerError::InvalidConfig(format!(
                "filler {}: defaultProfitPct must be in [0, 1]",
                self.name
            )));
        }
        if self.min_health_factor <= 1.0 {
            return Err(AuctioneerError::InvalidConfig(format!(
                "filler {}: minHealthFactor must be > 1",
                self.name
            )));
        }
        self.signing_key()?;
        Ok(())
    }
}

/// Select the profit target for an auction from the configured overrides,
/// falling back to the filler default. The first override whose supported
/// sets cover the auction's assets wins.
pub fn profit_pct(
    filler: &Filler,
    profits: &[AuctionProfit],
    bid_assets: &[String],
    lot_assets: &[String],
) -> f64 {
    for entry in profits.iter() {
        let bid: HashSet<&str> = entry.supported_bid.iter().map(String::as_str).collect();
        let lot: HashSet<&str> = entry.supported_lot.iter().map(String::as_str).collect();
        if bid_assets.iter().all(|a| bid.contains(a.as_str()))
            && lot_assets.iter().all(|a| lot.contains(a.as_str()))
        {
            return entry.profit_pct;
        }
    }
    filler.default_profit_pct
}

fn decode_secret(secret: &str) -> Result<SigningKey> {
    let raw = stellar_strkey::ed25519::PrivateKey::from_string(secret)
        .map_err(|_| AuctioneerError::InvalidConfig("invalid secret key".to_string()))?;
    Ok(SigningKey::from_bytes(&raw.0))
}

fn i128_from_string<'de, D>(deserializer: D) -> std::result::Result<i128, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<i128>().map_err(serde::de::Error::custom)
}
