use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::fmt;
use std::str::FromStr;

use crate::amounts::format_units;
use crate::config::Network;
use crate::error::{Error, Result};

/// A token balance in base units together with its human readable form.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub token: String,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: U256,
    pub decimals: u8,
    pub formatted: String,
}

impl Balance {
    pub fn new(token: String, amount: U256, decimals: u8) -> Self {
        let formatted = format_units(&amount, decimals);
        Self {
            token,
            amount,
            decimals,
            formatted,
        }
    }
}

/// Assets whose balance can be read from chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Native {
        symbol: String,
    },
    Erc20 {
        address: Address,
        symbol: String,
        decimals: u8,
    },
}

impl Token {
    pub fn symbol(&self) -> &str {
        match self {
            Token::Native { symbol } | Token::Erc20 { symbol, .. } => symbol,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Token::Native { .. } => 18,
            Token::Erc20 { decimals, .. } => *decimals,
        }
    }
}

/// Which caller is asking for a conversion. Spot holdings may be valued through
/// protocol-native exchange rates, Euler positions always use market quotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionContext {
    #[default]
    Default,
    Spot,
    Euler,
}

impl fmt::Display for ConversionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionContext::Default => write!(f, "default"),
            ConversionContext::Spot => write!(f, "spot"),
            ConversionContext::Euler => write!(f, "euler"),
        }
    }
}

impl FromStr for ConversionContext {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "default" => Ok(ConversionContext::Default),
            "spot" => Ok(ConversionContext::Spot),
            "euler" => Ok(ConversionContext::Euler),
            other => Err(format!("unknown conversion context {other:?}")),
        }
    }
}

/// Input of [`crate::QuoteService::get_quote`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub network: Network,
    pub sell_token: Address,
    pub buy_token: Address,
    /// Base units of the sell token.
    pub amount: U256,
    pub sell_token_decimals: u8,
    /// Looked up in the token registry when absent.
    pub buy_token_decimals: Option<u8>,
    pub sell_token_symbol: Option<String>,
    pub context: ConversionContext,
}

impl QuoteRequest {
    /// Parses `amount` as a non-negative base-unit integer.
    pub fn new(network: Network, sell_token: Address, buy_token: Address, amount: &str) -> Result<Self> {
        let amount = parse_amount(amount)?;
        Ok(Self {
            network,
            sell_token,
            buy_token,
            amount,
            sell_token_decimals: 18,
            buy_token_decimals: None,
            sell_token_symbol: None,
            context: ConversionContext::Default,
        })
    }

    pub fn with_sell_decimals(mut self, decimals: u8) -> Self {
        self.sell_token_decimals = decimals;
        self
    }

    pub fn with_buy_decimals(mut self, decimals: u8) -> Self {
        self.buy_token_decimals = Some(decimals);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        self.sell_token_symbol = (!symbol.is_empty()).then_some(symbol);
        self
    }

    pub fn with_context(mut self, context: ConversionContext) -> Self {
        self.context = context;
        self
    }

    pub fn symbol(&self) -> &str {
        self.sell_token_symbol.as_deref().unwrap_or("")
    }
}

/// Parses a decimal base-unit amount. Floats, signs and hex are rejected.
pub fn parse_amount(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmount(amount.to_string()));
    }
    U256::from_str_radix(trimmed, 10).map_err(|_| Error::InvalidAmount(amount.to_string()))
}

/// How a quote was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteSource {
    Direct,
    #[serde(rename = "CoWSwap")]
    CowSwap,
    #[serde(rename = "CoWSwap-Fallback")]
    CowSwapFallback,
    #[serde(rename = "Matured-PT")]
    MaturedPt,
    #[serde(rename = "Lido wstETH.stEthPerToken()")]
    StEthPerToken,
    #[serde(rename = "ERC4626.convertToAssets()")]
    ConvertToAssets,
    Failed,
    Error,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Direct => "Direct",
            QuoteSource::CowSwap => "CoWSwap",
            QuoteSource::CowSwapFallback => "CoWSwap-Fallback",
            QuoteSource::MaturedPt => "Matured-PT",
            QuoteSource::StEthPerToken => "Lido wstETH.stEthPerToken()",
            QuoteSource::ConvertToAssets => "ERC4626.convertToAssets()",
            QuoteSource::Failed => "Failed",
            QuoteSource::Error => "Error",
        }
    }
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionDetails {
    pub source: QuoteSource,
    pub rate: String,
    pub price_impact: String,
    pub fee_percentage: String,
    /// False only for the exact API quote and deterministic 1:1 shortcuts.
    pub fallback: bool,
    pub note: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_amount: Option<U256>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_amount: Option<U256>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<U256>,
    pub conversion_details: ConversionDetails,
}

impl QuoteResult {
    /// 1:1 passthrough of `amount`.
    pub fn direct(amount: U256, rate: &str, fallback: bool, note: impl Into<String>) -> Self {
        Self {
            buy_amount: Some(amount),
            sell_amount: Some(amount),
            fee_amount: Some(U256::ZERO),
            conversion_details: ConversionDetails {
                source: QuoteSource::Direct,
                rate: rate.to_string(),
                price_impact: "0.0000%".to_string(),
                fee_percentage: "0.0000%".to_string(),
                fallback,
                note: note.into(),
            },
        }
    }

    pub fn failed() -> Self {
        Self::unpriced(QuoteSource::Failed, "All quote attempts failed")
    }

    pub fn error(note: impl Into<String>) -> Self {
        Self::unpriced(QuoteSource::Error, note)
    }

    fn unpriced(source: QuoteSource, note: impl Into<String>) -> Self {
        Self {
            buy_amount: None,
            sell_amount: None,
            fee_amount: None,
            conversion_details: ConversionDetails {
                source,
                rate: "0".to_string(),
                price_impact: "N/A".to_string(),
                fee_percentage: "N/A".to_string(),
                fallback: true,
                note: note.into(),
            },
        }
    }

    pub fn source(&self) -> QuoteSource {
        self.conversion_details.source
    }

    pub fn is_priced(&self) -> bool {
        self.buy_amount.is_some()
    }
}
