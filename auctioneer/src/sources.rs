use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::config::{AppConfig, PriceSourceConfig, SymbolMapping};
use crate::dependencies::PriceSource;
use crate::errors::Result;
use crate::storage::PriceEntry;

/// Instantiate every configured price source. DEX sources need a Horizon
/// endpoint and are skipped with a warning when none is configured.
pub fn build_sources(config: &AppConfig) -> Vec<Arc<dyn PriceSource>> {
    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    for entry in config.price_sources.iter() {
        match entry {
            PriceSourceConfig::Coinbase { symbols } => {
                sources.push(Arc::new(CoinbaseSource::new(symbols.clone())));
            }
            PriceSourceConfig::Binance { symbols } => {
                sources.push(Arc::new(BinanceSource::new(symbols.clone())));
            }
            PriceSourceConfig::Dex {
                symbols,
                quote_asset,
            } => match &config.horizon_url {
                Some(horizon_url) => sources.push(Arc::new(DexSource::new(
                    horizon_url.clone(),
                    symbols.clone(),
                    quote_asset.clone(),
                ))),
                None => warn!("dex price source configured without a horizonURL, skipping"),
            },
        }
    }
    sources
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/********** Coinbase **********/

#[derive(Deserialize)]
struct CoinbaseProducts {
    products: Vec<CoinbaseProduct>,
}

#[derive(Deserialize)]
struct CoinbaseProduct {
    product_id: String,
    price: String,
}

/// Parse a Coinbase market products response into price entries for the
/// configured symbols. Unknown products and unparsable prices are skipped.
pub fn parse_coinbase(body: &str, symbols: &[SymbolMapping]) -> Result<Vec<PriceEntry>> {
    let response: CoinbaseProducts = serde_json::from_str(body)?;
    let timestamp = now_secs();
    let mut entries = Vec::new();
    for product in response.products {
        let mapping = symbols.iter().find(|s| s.symbol == product.product_id);
        if let (Some(mapping), Ok(price)) = (mapping, product.price.parse::<f64>()) {
            entries.push(PriceEntry {
                asset_id: mapping.asset_id.clone(),
                price,
                timestamp,
            });
        }
    }
    Ok(entries)
}

pub struct CoinbaseSource {
    client: reqwest::Client,
    base_url: String,
    symbols: Vec<SymbolMapping>,
}

impl CoinbaseSource {
    pub fn new(symbols: Vec<SymbolMapping>) -> Self {
        CoinbaseSource::with_base_url("https://api.coinbase.com".to_string(), symbols)
    }

    pub fn with_base_url(base_url: String, symbols: Vec<SymbolMapping>) -> Self {
        CoinbaseSource {
            client: reqwest::Client::new(),
            base_url,
            symbols,
        }
    }
}

#[async_trait]
impl PriceSource for CoinbaseSource {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn fetch(&self) -> Result<Vec<PriceEntry>> {
        let ids: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("product_ids={}", s.symbol))
            .collect();
        let url = format!(
            "{}/api/v3/brokerage/market/products?{}",
            self.base_url,
            ids.join("&")
        );
        let body = self.client.get(url).send().await?.text().await?;
        parse_coinbase(&body, &self.symbols)
    }
}

/********** Binance **********/

#[derive(Deserialize)]
struct BinanceTicker {
    symbol: String,
    price: String,
}

/// Parse a Binance ticker price response.
pub fn parse_binance(body: &str, symbols: &[SymbolMapping]) -> Result<Vec<PriceEntry>> {
    let response: Vec<BinanceTicker> = serde_json::from_str(body)?;
    let timestamp = now_secs();
    let mut entries = Vec::new();
    for ticker in response {
        let mapping = symbols.iter().find(|s| s.symbol == ticker.symbol);
        if let (Some(mapping), Ok(price)) = (mapping, ticker.price.parse::<f64>()) {
            entries.push(PriceEntry {
                asset_id: mapping.asset_id.clone(),
                price,
                timestamp,
            });
        }
    }
    Ok(entries)
}

pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
    symbols: Vec<SymbolMapping>,
}

impl BinanceSource {
    pub fn new(symbols: Vec<SymbolMapping>) -> Self {
        BinanceSource::with_base_url("https://api.binance.com".to_string(), symbols)
    }

    pub fn with_base_url(base_url: String, symbols: Vec<SymbolMapping>) -> Self {
        BinanceSource {
            client: reqwest::Client::new(),
            base_url,
            symbols,
        }
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch(&self) -> Result<Vec<PriceEntry>> {
        let list: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("\"{}\"", s.symbol))
            .collect();
        let url = format!(
            "{}/api/v3/ticker/price?symbols=[{}]",
            self.base_url,
            list.join(",")
        );
        let body = self.client.get(url).send().await?.text().await?;
        parse_binance(&body, &self.symbols)
    }
}

/********** DEX via Horizon path payments **********/

#[derive(Deserialize)]
struct HorizonPaths {
    #[serde(rename = "_embedded")]
    embedded: HorizonEmbedded,
}

#[derive(Deserialize)]
struct HorizonEmbedded {
    records: Vec<HorizonPathRecord>,
}

#[derive(Deserialize)]
struct HorizonPathRecord {
    source_amount: String,
}

/// Derive a price from a strict-receive path quote: the source amount needed
/// to receive exactly `destination_amount` of the quote asset.
pub fn parse_strict_receive_price(body: &str, destination_amount: f64) -> Result<Option<f64>> {
    let response: HorizonPaths = serde_json::from_str(body)?;
    let record = match response.embedded.records.first() {
        Some(record) => record,
        None => return Ok(None),
    };
    let source_amount: f64 = match record.source_amount.parse() {
        Ok(amount) if amount > 0.0 => amount,
        _ => return Ok(None),
    };
    Ok(Some(destination_amount / source_amount))
}

/// Prices assets from on-chain liquidity via a Horizon strict-receive path
/// lookup against the quote currency.
pub struct DexSource {
    client: reqwest::Client,
    horizon_url: String,
    /// symbol holds the asset in Horizon `CODE:ISSUER` form
    symbols: Vec<SymbolMapping>,
    quote_asset: String,
}

/// Quote size for DEX lookups, in whole units of the quote currency
const DEX_QUOTE_AMOUNT: f64 = 100.0;

impl DexSource {
    pub fn new(horizon_url: String, symbols: Vec<SymbolMapping>, quote_asset: String) -> Self {
        DexSource {
            client: reqwest::Client::new(),
            horizon_url,
            symbols,
            quote_asset,
        }
    }
}

#[async_trait]
impl PriceSource for DexSource {
    fn name(&self) -> &str {
        "dex"
    }

    async fn fetch(&self) -> Result<Vec<PriceEntry>> {
        let mut entries = Vec::new();
        let timestamp = now_secs();
        let (quote_code, quote_issuer) =
            self.quote_asset.split_once(':').unwrap_or((self.quote_asset.as_str(), ""));
        for mapping in self.symbols.iter() {
            let (code, issuer) = mapping.symbol.split_once(':').unwrap_or((mapping.symbol.as_str(), ""));
            let url = format!(
                "{}/paths/strict-receive?source_asset_type=credit_alphanum4&source_asset_code={}&source_asset_issuer={}&destination_asset_type=credit_alphanum4&destination_asset_code={}&destination_asset_issuer={}&destination_amount={}",
                self.horizon_url, code, issuer, quote_code, quote_issuer, DEX_QUOTE_AMOUNT
            );
            let body = self.client.get(url).send().await?.text().await?;
            if let Some(price) = parse_strict_receive_price(&body, DEX_QUOTE_AMOUNT)? {
                entries.push(PriceEntry {
                    asset_id: mapping.asset_id.clone(),
                    price,
                    timestamp,
                });
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings() -> Vec<SymbolMapping> {
        vec![
            SymbolMapping {
                symbol: "XLM-USD".to_string(),
                asset_id: "CXLM".to_string(),
            },
            SymbolMapping {
                symbol: "XLMUSDT".to_string(),
                asset_id: "CXLM".to_string(),
            },
        ]
    }

    #[test]
    fn test_parse_coinbase() {
        let body = r#"{"products": [
            {"product_id": "XLM-USD", "price": "0.0991"},
            {"product_id": "BTC-USD", "price": "60123.12"}
        ]}"#;
        let entries = parse_coinbase(body, &mappings()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].asset_id, "CXLM");
        assert_eq!(entries[0].price, 0.0991);
    }

    #[test]
    fn test_parse_binance() {
        let body = r#"[
            {"symbol": "XLMUSDT", "price": "0.09920000"},
            {"symbol": "ETHUSDT", "price": "3000.1"}
        ]"#;
        let entries = parse_binance(body, &mappings()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].asset_id, "CXLM");
        assert!((entries[0].price - 0.0992).abs() < 1e-12);
    }

    #[test]
    fn test_parse_binance_malformed_is_error() {
        assert!(parse_binance("not json", &mappings()).is_err());
    }

    #[test]
    fn test_parse_strict_receive_price() {
        let body = r#"{"_embedded": {"records": [
            {"source_amount": "1010.5000000"},
            {"source_amount": "1011.0000000"}
        ]}}"#;
        let price = parse_strict_receive_price(body, 100.0).unwrap().unwrap();
        // paying 1010.5 of the asset for 100 USDC prices it at ~0.09896
        assert!((price - 100.0 / 1010.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse_strict_receive_no_path() {
        let body = r#"{"_embedded": {"records": []}}"#;
        assert!(parse_strict_receive_price(body, 100.0).unwrap().is_none());
    }
}
