use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::BlockNumberOrTag;
use alloy::sol;
use async_trait::async_trait;
use reqwest::Url;

use crate::chain::ChainProvider;
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::retry::{RetryExecutor, RetryPolicy};

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IWstETH {
        function stEthPerToken() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC4626 {
        function convertToAssets(uint256 shares) external view returns (uint256);
    }
}

/// EVM chain provider using JSON-RPC. Every read goes through the retry
/// executor.
pub struct EthereumProvider {
    rpc_url: Url,
    retry: RetryExecutor,
}

impl EthereumProvider {
    pub fn new(rpc_url: &str, policy: RetryPolicy) -> Result<Self> {
        let rpc_url = rpc_url
            .parse::<Url>()
            .map_err(|err| Error::Config(format!("invalid rpc url {rpc_url:?}: {err}")))?;
        Ok(Self {
            rpc_url,
            retry: RetryExecutor::new(policy),
        })
    }

    pub fn from_network(network: &NetworkConfig, policy: RetryPolicy) -> Result<Self> {
        Self::new(&network.rpc, policy)
    }
}

#[async_trait]
impl ChainProvider for EthereumProvider {
    async fn get_native_balance(&self, owner: Address) -> Result<U256> {
        let rpc_url = &self.rpc_url;
        self.retry
            .execute(move || async move {
                let provider = ProviderBuilder::new().on_http(rpc_url.clone());
                provider
                    .get_balance(owner)
                    .block_id(BlockNumberOrTag::Latest.into())
                    .await
                    .map_err(|err| Error::Rpc(err.to_string()))
            })
            .await
    }

    async fn get_token_balance(&self, owner: Address, token: Address) -> Result<U256> {
        let rpc_url = &self.rpc_url;
        self.retry
            .execute(move || async move {
                let provider = ProviderBuilder::new().on_http(rpc_url.clone());
                let contract = IERC20::new(token, provider);
                Ok(contract.balanceOf(owner).call().await?._0)
            })
            .await
    }

    async fn steth_per_token(&self, token: Address) -> Result<U256> {
        let rpc_url = &self.rpc_url;
        self.retry
            .execute(move || async move {
                let provider = ProviderBuilder::new().on_http(rpc_url.clone());
                let contract = IWstETH::new(token, provider);
                Ok(contract.stEthPerToken().call().await?._0)
            })
            .await
    }

    async fn convert_to_assets(&self, vault: Address, shares: U256) -> Result<U256> {
        let rpc_url = &self.rpc_url;
        self.retry
            .execute(move || async move {
                let provider = ProviderBuilder::new().on_http(rpc_url.clone());
                let contract = IERC4626::new(vault, provider);
                Ok(contract.convertToAssets(shares).call().await?._0)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Network};

    #[test]
    fn test_invalid_rpc_url() {
        assert!(matches!(
            EthereumProvider::new("not a url", RetryPolicy::default()),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_mainnet_reads() {
        let config = Config::load().unwrap();
        let ethereum = config.network(Network::Ethereum).unwrap();
        let provider = EthereumProvider::from_network(ethereum, RetryPolicy::default()).unwrap();

        let wsteth = ethereum.token("wstETH").unwrap().address;
        let rate = provider.steth_per_token(wsteth).await.unwrap();
        assert!(rate > U256::from(10u64).pow(U256::from(18u64)));

        // The wstETH contract holds the stETH it wraps.
        let steth = ethereum.token("stETH").unwrap().address;
        let balance = provider.get_token_balance(wsteth, steth).await.unwrap();
        assert!(balance > U256::ZERO);
    }
}
