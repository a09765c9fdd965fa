pub mod amounts;
mod chain;
mod config;
mod cow;
mod error;
mod ethereum;
mod native;
mod quote;
mod retry;
mod types;
mod valuation;

pub use chain::ChainProvider;
pub use config::{Config, Deployment, NativeMethod, Network, NetworkConfig, TokenInfo};
pub use cow::{is_fee_too_small_error, CowApi, OrderQuote, OrderQuoteRequest, QuoteApi, QuoteResponse};
pub use error::{Error, Result, Retryable};
pub use ethereum::EthereumProvider;
pub use quote::QuoteService;
pub use retry::{RetryExecutor, RetryPolicy};
pub use types::{
    parse_amount, Balance, ConversionContext, ConversionDetails, QuoteRequest, QuoteResult,
    QuoteSource, Token,
};
pub use valuation::{Position, Valuation, WalletValuator};

use alloy::primitives::Address;
use std::sync::Arc;

/// Value the holdings of `owner` on `network` using JSON-RPC reads and CoW quotes
pub async fn value_wallet(
    config: Arc<Config>,
    network: Network,
    owner: Address,
    context: ConversionContext,
) -> Result<Valuation> {
    let chain = config.network(network)?;
    let provider = EthereumProvider::from_network(chain, config.retry.clone())?;
    let quotes = QuoteService::from_config(config.clone())?;

    WalletValuator::new(network, Arc::new(quotes), Arc::new(provider))
        .with_context(context)
        .value(owner)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loads() {
        assert!(Config::load_deployment(Deployment::Weth).is_ok());
        assert!(Config::load_deployment(Deployment::Usdc).is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_value_mainnet_wallet() {
        let config = Arc::new(Config::load().unwrap());
        let owner: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();

        let valuation = value_wallet(config, Network::Ethereum, owner, ConversionContext::Spot)
            .await
            .unwrap();

        assert_eq!(valuation.unit_of_account, "WETH");
        assert!(!valuation.positions.is_empty()); // At least ETH
        assert!(valuation.total > alloy::primitives::U256::ZERO);
    }
}
