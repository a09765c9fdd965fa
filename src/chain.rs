use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::error::Result;
use crate::types::Token;

/// On-chain reads needed to value a wallet - implement this for each RPC backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Get the native token balance for an address
    async fn get_native_balance(&self, owner: Address) -> Result<U256>;

    /// Get the ERC-20 balance of `token` for an address
    async fn get_token_balance(&self, owner: Address, token: Address) -> Result<U256>;

    /// Lido `stEthPerToken()`, stETH per wstETH scaled by 1e18.
    async fn steth_per_token(&self, token: Address) -> Result<U256>;

    /// ERC-4626 `convertToAssets(shares)`.
    async fn convert_to_assets(&self, vault: Address, shares: U256) -> Result<U256>;

    /// Balance of either a native or an ERC-20 token
    async fn get_balance(&self, owner: Address, token: &Token) -> Result<U256> {
        match token {
            Token::Native { .. } => self.get_native_balance(owner).await,
            Token::Erc20 { address, .. } => self.get_token_balance(owner, *address).await,
        }
    }
}
