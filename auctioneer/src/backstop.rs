use tracing::debug;

use crate::constants::SCALAR_7;
use crate::dependencies::ChainClient;
use crate::errors::Result;

/// Value an amount of backstop LP tokens in the quote currency.
///
/// A simulated single-sided withdrawal prices in the pool's actual slippage;
/// the spot price is only a last-resort approximation when the simulation is
/// unavailable.
pub async fn value_backstop_lp_in_usdc(client: &dyn ChainClient, lp_amount: i128) -> Result<f64> {
    if lp_amount <= 0 {
        return Ok(0.0);
    }
    match client.simulate_backstop_withdrawal(lp_amount).await {
        Ok(Some(usdc_out)) => Ok(usdc_out as f64 / SCALAR_7 as f64),
        Ok(None) => spot_value(client, lp_amount).await,
        Err(error) => {
            debug!(?error, "backstop withdrawal simulation failed");
            spot_value(client, lp_amount).await
        }
    }
}

/// The quote value of one whole backstop LP token, priced at the size of the
/// position being valued.
pub async fn lp_token_unit_price(client: &dyn ChainClient, lp_amount: i128) -> Result<f64> {
    if lp_amount <= 0 {
        return client.backstop_token_spot_price().await;
    }
    let value = value_backstop_lp_in_usdc(client, lp_amount).await?;
    Ok(value / (lp_amount as f64 / SCALAR_7 as f64))
}

async fn spot_value(client: &dyn ChainClient, lp_amount: i128) -> Result<f64> {
    let spot = client.backstop_token_spot_price().await?;
    Ok(lp_amount as f64 / SCALAR_7 as f64 * spot)
}
