//! Conversion quotes with graceful degradation.
//!
//! [`QuoteService::get_quote`] walks a fixed ladder and stops at the first
//! rung that applies:
//!
//! 1. direct 1:1 passthrough for configured symbols (no API call),
//! 2. a CoW quote for the exact amount,
//! 3. when the amount is too small to cover the protocol fee, either a
//!    configured peg (1:1) or a quote for a reference amount whose rate is
//!    applied linearly to the original amount,
//! 4. a `Failed` result.
//!
//! Pricing problems never surface as `Err`: callers aggregate many positions
//! and a single unpriceable token must not abort them. Only configuration
//! errors are returned.

use alloy::primitives::{Address, U256};
use bigdecimal::{BigDecimal, Zero};
use std::sync::Arc;

use crate::amounts::{denormalize, format_fixed, normalize, u256_to_big_decimal};
use crate::config::{Config, NetworkConfig};
use crate::cow::{
    is_fee_too_small_error, unix_now, CowApi, OrderQuote, OrderQuoteRequest, QuoteApi, QuoteResponse,
};
use crate::error::Result;
use crate::retry::RetryExecutor;
use crate::types::{ConversionDetails, QuoteRequest, QuoteResult, QuoteSource};

const RATE_PLACES: u32 = 6;
const PERCENT_PLACES: u32 = 4;

pub struct QuoteService {
    config: Arc<Config>,
    api: Arc<dyn QuoteApi>,
    retry: RetryExecutor,
}

impl QuoteService {
    pub fn new(config: Arc<Config>, api: Arc<dyn QuoteApi>) -> Self {
        let retry = RetryExecutor::new(config.retry.clone());
        Self { config, api, retry }
    }

    /// Service backed by the CoW HTTP API.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let api = CowApi::from_config(&config)?;
        Ok(Self::new(config, Arc::new(api)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResult> {
        let chain = self.config.network(request.network)?;
        let symbol = request.symbol();

        if self.config.is_direct_symbol(symbol) || request.sell_token == request.buy_token {
            return Ok(QuoteResult::direct(
                request.amount,
                "1",
                false,
                "Direct 1:1 conversion",
            ));
        }

        let buy_decimals = self.buy_decimals(chain, request.buy_token, request.buy_token_decimals);
        tracing::debug!(
            network = %request.network,
            symbol,
            context = %request.context,
            amount = %request.amount,
            "requesting quote"
        );

        let order = OrderQuoteRequest::sell(
            request.sell_token,
            request.buy_token,
            request.amount,
            unix_now(),
            self.config.quote_validity,
        );

        let body = match self.post(request, &order).await {
            Some(QuoteResponse::Quoted(quote)) => {
                return Ok(direct_quote(&quote, request, buy_decimals));
            }
            Some(QuoteResponse::Rejected { body, .. }) => body,
            None => return Ok(QuoteResult::failed()),
        };

        if !is_fee_too_small_error(&body) {
            tracing::warn!(symbol, %body, "quote rejected");
            return Ok(QuoteResult::failed());
        }

        if let Some(pegged_to) = self.config.peg_for(symbol) {
            tracing::info!(symbol, pegged_to, "amount too small to quote, using peg");
            return Ok(QuoteResult::direct(
                request.amount,
                "1.000000",
                true,
                format!(
                    "Amount too small to quote; assuming {symbol} is pegged 1:1 to {pegged_to}"
                ),
            ));
        }

        let reference_amount = self.reference_amount(request.sell_token_decimals);
        tracing::info!(symbol, %reference_amount, "amount too small to quote, using reference amount");
        match self.post(request, &order.with_amount(reference_amount)).await {
            Some(QuoteResponse::Quoted(quote)) => Ok(reference_quote(
                &quote,
                request,
                buy_decimals,
                self.config.reference_amount_tokens,
            )),
            Some(QuoteResponse::Rejected { body, .. }) => {
                tracing::warn!(symbol, %body, "reference quote rejected");
                Ok(QuoteResult::failed())
            }
            None => Ok(QuoteResult::failed()),
        }
    }

    /// Quote for a matured Pendle PT. The PT redeems 1:1 into its underlying,
    /// so `underlying` is quoted for the same base-unit amount.
    pub async fn get_matured_pt_quote(
        &self,
        pt_symbol: &str,
        underlying: &QuoteRequest,
    ) -> Result<QuoteResult> {
        let mut result = self.get_quote(underlying).await?;
        if !result.is_priced() {
            return Ok(result);
        }

        let inner = result.conversion_details.source;
        result.conversion_details.source = QuoteSource::MaturedPt;
        result.conversion_details.note = format!(
            "{pt_symbol} matured - Direct 1:1 conversion to {}, then {inner} quote",
            underlying.symbol()
        );
        Ok(result)
    }

    /// `None` when the API could not be reached within the retry budget.
    async fn post(&self, request: &QuoteRequest, order: &OrderQuoteRequest) -> Option<QuoteResponse> {
        let api = &self.api;
        let network = request.network;
        match self.retry.execute(move || api.quote(network, order)).await {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(symbol = request.symbol(), error = %err, "quote request failed");
                None
            }
        }
    }

    fn reference_amount(&self, sell_decimals: u8) -> U256 {
        U256::from(self.config.reference_amount_tokens)
            .saturating_mul(U256::from(10u64).pow(U256::from(sell_decimals)))
    }

    /// Explicit decimals win, then the token registry, then USDC/18 inference.
    fn buy_decimals(&self, chain: &NetworkConfig, buy_token: Address, explicit: Option<u8>) -> u8 {
        if let Some(decimals) = explicit {
            return decimals;
        }
        if let Some((_, token)) = chain.token_by_address(buy_token) {
            return token.decimals;
        }
        if chain.usdc_address() == Some(buy_token) {
            6
        } else {
            18
        }
    }
}

/// `(buy / 10^buy_decimals) / (sell / 10^sell_decimals)`, `None` for a zero sell amount.
fn quote_rate(quote: &OrderQuote, sell_decimals: u8, buy_decimals: u8) -> Option<BigDecimal> {
    let sell = normalize(&quote.sell_amount, sell_decimals);
    if sell.is_zero() {
        return None;
    }
    Some(normalize(&quote.buy_amount, buy_decimals) / sell)
}

fn direct_quote(quote: &OrderQuote, request: &QuoteRequest, buy_decimals: u8) -> QuoteResult {
    let Some(rate) = quote_rate(quote, request.sell_token_decimals, buy_decimals) else {
        return QuoteResult::error("Technical error: quote reported a zero sellAmount");
    };

    let fee_percentage = if request.amount.is_zero() {
        BigDecimal::zero()
    } else {
        u256_to_big_decimal(&quote.fee_amount) / u256_to_big_decimal(&request.amount)
            * BigDecimal::from(100)
    };

    QuoteResult {
        buy_amount: Some(quote.buy_amount),
        sell_amount: Some(quote.sell_amount),
        fee_amount: Some(quote.fee_amount),
        conversion_details: ConversionDetails {
            source: QuoteSource::CowSwap,
            rate: format_fixed(&rate, RATE_PLACES),
            price_impact: quote.price_impact(),
            fee_percentage: format!("{}%", format_fixed(&fee_percentage, PERCENT_PLACES)),
            fallback: false,
            note: "Direct CoWSwap quote".to_string(),
        },
    }
}

/// Applies the rate of a reference-sized quote to the original amount.
fn reference_quote(
    quote: &OrderQuote,
    request: &QuoteRequest,
    buy_decimals: u8,
    reference_tokens: u64,
) -> QuoteResult {
    let Some(rate) = quote_rate(quote, request.sell_token_decimals, buy_decimals) else {
        return QuoteResult::error("Technical error: reference quote reported a zero sellAmount");
    };

    let original = normalize(&request.amount, request.sell_token_decimals);
    let Some(estimated) = denormalize(&(original * &rate), buy_decimals) else {
        return QuoteResult::error("Technical error: estimated amount out of range");
    };

    QuoteResult {
        buy_amount: Some(estimated),
        sell_amount: Some(request.amount),
        fee_amount: Some(U256::ZERO),
        conversion_details: ConversionDetails {
            source: QuoteSource::CowSwapFallback,
            rate: format_fixed(&rate, RATE_PLACES),
            price_impact: "N/A".to_string(),
            fee_percentage: "N/A".to_string(),
            fallback: true,
            note: format!(
                "Using reference amount of {reference_tokens} tokens for price discovery"
            ),
        },
    }
}
