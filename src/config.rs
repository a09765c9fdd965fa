use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::ConversionContext;

/// Networks a deployment may be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Ethereum,
    Base,
    MonadTestnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Base => "base",
            Network::MonadTestnet => "monad-testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "mainnet" => Ok(Network::Ethereum),
            "base" => Ok(Network::Base),
            "monad-testnet" => Ok(Network::MonadTestnet),
            _ => Err(Error::UnknownNetwork(s.to_string())),
        }
    }
}

/// Unit of account a deployment reports in. Each one ships as an embedded
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    #[default]
    Weth,
    Usdc,
}

impl FromStr for Deployment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "weth" => Ok(Deployment::Weth),
            "usdc" => Ok(Deployment::Usdc),
            _ => Err(Error::Config(format!("unknown deployment {s:?}"))),
        }
    }
}

/// Protocol-native exchange rate getter for a yield-bearing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NativeMethod {
    /// Lido `wstETH.stEthPerToken()`.
    StEthPerToken,
    /// ERC-4626 `convertToAssets(shares)`.
    ConvertToAssets,
}

/// Configuration for one deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub unit_of_account: String,
    /// Sell symbols that are valued 1:1 without asking the quote API.
    #[serde(default)]
    pub direct_symbols: Vec<String>,
    /// Symbols assumed to trade 1:1 with another asset when too small to quote.
    #[serde(default)]
    pub pegs: BTreeMap<String, String>,
    #[serde(default = "default_reference_amount")]
    pub reference_amount_tokens: u64,
    #[serde(with = "humantime_serde", default = "default_quote_validity")]
    pub quote_validity: Duration,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_native_contexts")]
    pub native_conversion_contexts: Vec<ConversionContext>,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub networks: BTreeMap<Network, NetworkConfig>,
}

fn default_reference_amount() -> u64 {
    1000
}

fn default_quote_validity() -> Duration {
    Duration::from_secs(3600)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_native_contexts() -> Vec<ConversionContext> {
    vec![ConversionContext::Spot]
}

/// Configuration for a single network
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc: String,
    /// Environment variable that overrides `rpc` at start-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_env: Option<String>,
    /// Base URL of the CoW Protocol API, without the `/api/v1` suffix.
    pub quote_api: String,
    pub native_symbol: String,
    pub wrapped_native: String,
    pub tokens: BTreeMap<String, TokenInfo>,
}

/// Token information from config
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_conversion: Option<NativeMethod>,
    /// Decimals of the asset `native_conversion` yields, when they differ
    /// from the token's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_decimals: Option<u8>,
    /// Symbol a Pendle PT redeems into at maturity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
    /// Unix timestamp of PT maturity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl TokenInfo {
    pub fn asset_decimals(&self) -> u8 {
        self.asset_decimals.unwrap_or(self.decimals)
    }

    pub fn is_matured(&self, now: u64) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

impl Config {
    /// Load the default (WETH) deployment from embedded JSON
    pub fn load() -> Result<Self> {
        Self::load_deployment(Deployment::default())
    }

    pub fn load_deployment(deployment: Deployment) -> Result<Self> {
        let config_str = match deployment {
            Deployment::Weth => include_str!("../config/weth.json"),
            Deployment::Usdc => include_str!("../config/usdc.json"),
        };
        Self::from_json(config_str)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_json(&config_str)
    }

    pub fn from_json(config_str: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.retry
            .validate()
            .map_err(|err| Error::Config(format!("retry: {err}")))?;
        for (network, chain) in &self.networks {
            for symbol in [&self.unit_of_account, &chain.wrapped_native] {
                if chain.token(symbol).is_none() {
                    return Err(Error::Config(format!(
                        "{network} does not list {symbol} in its tokens"
                    )));
                }
            }
            for (symbol, token) in &chain.tokens {
                if let Some(underlying) = &token.underlying {
                    if chain.token(underlying).is_none() {
                        return Err(Error::Config(format!(
                            "{symbol} on {network} redeems into unlisted token {underlying}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace RPC URLs with the values of each network's `rpcEnv` variable
    /// when set. Meant to be called once at start-up.
    pub fn apply_env_overrides(&mut self) {
        for chain in self.networks.values_mut() {
            let Some(var) = &chain.rpc_env else {
                continue;
            };
            if let Ok(rpc) = std::env::var(var) {
                if !rpc.is_empty() {
                    chain.rpc = rpc;
                }
            }
        }
    }

    /// Get a specific network configuration
    pub fn network(&self, network: Network) -> Result<&NetworkConfig> {
        self.networks
            .get(&network)
            .ok_or(Error::UnsupportedNetwork(network))
    }

    pub fn is_direct_symbol(&self, symbol: &str) -> bool {
        self.direct_symbols.iter().any(|s| s == symbol)
    }

    pub fn peg_for(&self, symbol: &str) -> Option<&str> {
        self.pegs.get(symbol).map(String::as_str)
    }

    pub fn native_conversion_enabled(&self, context: ConversionContext) -> bool {
        self.native_conversion_contexts.contains(&context)
    }
}

impl NetworkConfig {
    pub fn token(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.get(symbol)
    }

    pub fn token_by_address(&self, address: Address) -> Option<(&str, &TokenInfo)> {
        self.tokens
            .iter()
            .find(|(_, token)| token.address == address)
            .map(|(symbol, token)| (symbol.as_str(), token))
    }

    pub fn usdc_address(&self) -> Option<Address> {
        self.token("USDC").map(|token| token.address)
    }

    pub fn quote_url(&self) -> String {
        format!("{}/api/v1/quote", self.quote_api.trim_end_matches('/'))
    }
}
