//! Valuation through protocol exchange rates instead of market quotes.
//!
//! The underlying asset (stETH, ETH, USDS) is taken to be worth the unit of
//! account 1:1. Only the decimals are converted.

use alloy::primitives::U256;
use bigdecimal::{BigDecimal, Zero};

use crate::amounts::{denormalize, format_fixed, normalize};
use crate::chain::ChainProvider;
use crate::config::{NativeMethod, TokenInfo};
use crate::error::{Error, Result};
use crate::types::{ConversionDetails, QuoteResult, QuoteSource};

const WAD_DECIMALS: u8 = 18;

/// Values `amount` of `token` in base units of a unit of account with
/// `unit_decimals`.
///
/// Never fails: read errors are reported as an `Error` result.
pub async fn convert(
    chain: &dyn ChainProvider,
    method: NativeMethod,
    symbol: &str,
    token: &TokenInfo,
    amount: U256,
    unit_decimals: u8,
) -> QuoteResult {
    let converted = match method {
        NativeMethod::StEthPerToken => steth_per_token(chain, token, amount, unit_decimals).await,
        NativeMethod::ConvertToAssets => {
            convert_to_assets(chain, token, amount, unit_decimals).await
        }
    };

    match converted {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(symbol, error = %err, "native conversion failed");
            let message: String = err.to_string().chars().take(200).collect();
            QuoteResult::error(format!("{symbol} native conversion failed: {message}"))
        }
    }
}

async fn steth_per_token(
    chain: &dyn ChainProvider,
    token: &TokenInfo,
    amount: U256,
    unit_decimals: u8,
) -> Result<QuoteResult> {
    let steth_per_token = chain.steth_per_token(token.address).await?;
    let wad = U256::from(10u64).pow(U256::from(WAD_DECIMALS));
    let converted = amount.saturating_mul(steth_per_token) / wad;
    let rate = normalize(&steth_per_token, WAD_DECIMALS);

    Ok(native_result(
        QuoteSource::StEthPerToken,
        amount,
        rescale(converted, token.asset_decimals(), unit_decimals)?,
        &rate,
        "stEthPerToken()",
    ))
}

async fn convert_to_assets(
    chain: &dyn ChainProvider,
    token: &TokenInfo,
    amount: U256,
    unit_decimals: u8,
) -> Result<QuoteResult> {
    let converted = chain.convert_to_assets(token.address, amount).await?;
    let shares = normalize(&amount, token.decimals);
    let rate = if shares.is_zero() {
        BigDecimal::zero()
    } else {
        normalize(&converted, token.asset_decimals()) / shares
    };

    Ok(native_result(
        QuoteSource::ConvertToAssets,
        amount,
        rescale(converted, token.asset_decimals(), unit_decimals)?,
        &rate,
        "convertToAssets()",
    ))
}

/// Moves an amount between decimal bases, rounding down.
fn rescale(amount: U256, from_decimals: u8, to_decimals: u8) -> Result<U256> {
    if from_decimals == to_decimals {
        return Ok(amount);
    }
    denormalize(&normalize(&amount, from_decimals), to_decimals)
        .ok_or_else(|| Error::InvalidAmount(format!("{amount} does not fit {to_decimals} decimals")))
}

fn native_result(
    source: QuoteSource,
    amount: U256,
    converted: U256,
    rate: &BigDecimal,
    getter: &str,
) -> QuoteResult {
    let rate = format_fixed(rate, 6);
    QuoteResult {
        buy_amount: Some(converted),
        sell_amount: Some(amount),
        fee_amount: Some(U256::ZERO),
        conversion_details: ConversionDetails {
            source,
            note: format!("Native conversion using {getter} = {rate}"),
            rate,
            price_impact: "0.0000".to_string(),
            fee_percentage: "0.0000".to_string(),
            fallback: false,
        },
    }
}
