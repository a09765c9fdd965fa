//! Net asset value of a wallet in the deployment's unit of account.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};
use std::sync::Arc;

use crate::amounts::format_units;
use crate::chain::ChainProvider;
use crate::config::{Network, NetworkConfig, TokenInfo};
use crate::cow::unix_now;
use crate::error::{Error, Result};
use crate::native;
use crate::quote::QuoteService;
use crate::types::{Balance, ConversionContext, ConversionDetails, QuoteRequest, QuoteResult, Token};

/// One held asset and what it is worth.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub balance: Balance,
    /// `None` when the asset could not be priced.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub value: Option<U256>,
    pub conversion_details: ConversionDetails,
}

impl Position {
    fn new(balance: Balance, result: QuoteResult) -> Self {
        Self {
            balance,
            value: result.buy_amount,
            conversion_details: result.conversion_details,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub network: Network,
    pub owner: Address,
    pub unit_of_account: String,
    pub unit_decimals: u8,
    /// Sum of all priced positions, in unit-of-account base units.
    #[serde_as(as = "DisplayFromStr")]
    pub total: U256,
    pub total_formatted: String,
    pub positions: Vec<Position>,
    /// Symbols held but not priced; they count as zero in `total`.
    pub unresolved: Vec<String>,
}

pub struct WalletValuator {
    network: Network,
    quotes: Arc<QuoteService>,
    chain: Arc<dyn ChainProvider>,
    context: ConversionContext,
}

impl WalletValuator {
    pub fn new(network: Network, quotes: Arc<QuoteService>, chain: Arc<dyn ChainProvider>) -> Self {
        Self {
            network,
            quotes,
            chain,
            context: ConversionContext::Spot,
        }
    }

    pub fn with_context(mut self, context: ConversionContext) -> Self {
        self.context = context;
        self
    }

    /// Values the native balance and every registered token held by `owner`.
    ///
    /// Unreadable balances and unpriceable tokens are reported per position
    /// and never abort the valuation. Only configuration problems are errors.
    pub async fn value(&self, owner: Address) -> Result<Valuation> {
        let config = self.quotes.config();
        let chain = config.network(self.network)?;
        let unit = registered(self.network, chain, &config.unit_of_account)?;

        let mut positions = Vec::new();

        let native = Token::Native {
            symbol: chain.native_symbol.clone(),
        };
        if let Some(position) = self.native_position(owner, chain, unit, &native).await? {
            positions.push(position);
        }

        for (symbol, token) in &chain.tokens {
            let erc20 = Token::Erc20 {
                address: token.address,
                symbol: symbol.clone(),
                decimals: token.decimals,
            };
            let amount = match self.chain.get_balance(owner, &erc20).await {
                Ok(amount) => amount,
                Err(err) => {
                    positions.push(unreadable(&erc20, &err));
                    continue;
                }
            };
            if amount.is_zero() {
                continue;
            }

            let result = self.value_token(chain, unit, symbol, token, amount).await?;
            positions.push(Position::new(
                Balance::new(symbol.clone(), amount, token.decimals),
                result,
            ));
        }

        let total = positions
            .iter()
            .filter_map(|position| position.value)
            .fold(U256::ZERO, |total, value| total.saturating_add(value));
        let unresolved = positions
            .iter()
            .filter(|position| position.value.is_none())
            .map(|position| position.balance.token.clone())
            .collect::<Vec<_>>();

        if !unresolved.is_empty() {
            tracing::warn!(network = %self.network, ?unresolved, "positions left unpriced");
        }

        Ok(Valuation {
            network: self.network,
            owner,
            unit_of_account: config.unit_of_account.clone(),
            unit_decimals: unit.decimals,
            total,
            total_formatted: format_units(&total, unit.decimals),
            positions,
            unresolved,
        })
    }

    /// The native balance is priced as the wrapped native token.
    async fn native_position(
        &self,
        owner: Address,
        chain: &NetworkConfig,
        unit: &TokenInfo,
        native: &Token,
    ) -> Result<Option<Position>> {
        let amount = match self.chain.get_balance(owner, native).await {
            Ok(amount) => amount,
            Err(err) => return Ok(Some(unreadable(native, &err))),
        };
        if amount.is_zero() {
            return Ok(None);
        }

        let config = self.quotes.config();
        let result = if config.unit_of_account == chain.wrapped_native {
            QuoteResult::direct(amount, "1.000000", false, "Native token valued 1:1 as its wrapped form")
        } else {
            let wrapped = registered(self.network, chain, &chain.wrapped_native)?;
            let request = self.request(wrapped.address, wrapped.decimals, &chain.wrapped_native, unit, amount);
            self.quotes.get_quote(&request).await?
        };

        Ok(Some(Position::new(
            Balance::new(native.symbol().to_string(), amount, native.decimals()),
            result,
        )))
    }

    async fn value_token(
        &self,
        chain: &NetworkConfig,
        unit: &TokenInfo,
        symbol: &str,
        token: &TokenInfo,
        amount: U256,
    ) -> Result<QuoteResult> {
        let config = self.quotes.config();

        if symbol == config.unit_of_account {
            return Ok(QuoteResult::direct(amount, "1.000000", false, "Unit of account"));
        }

        if let Some(underlying) = token.underlying.as_deref().filter(|_| token.is_matured(unix_now())) {
            let redeemed = registered(self.network, chain, underlying)?;
            let request = self.request(redeemed.address, redeemed.decimals, underlying, unit, amount);
            return self.quotes.get_matured_pt_quote(symbol, &request).await;
        }

        if let Some(method) = token.native_conversion {
            if config.native_conversion_enabled(self.context) {
                let chain = self.chain.as_ref();
                return Ok(native::convert(chain, method, symbol, token, amount, unit.decimals).await);
            }
        }

        let request = self.request(token.address, token.decimals, symbol, unit, amount);
        self.quotes.get_quote(&request).await
    }

    fn request(
        &self,
        sell_token: Address,
        sell_token_decimals: u8,
        symbol: &str,
        unit: &TokenInfo,
        amount: U256,
    ) -> QuoteRequest {
        QuoteRequest {
            network: self.network,
            sell_token,
            buy_token: unit.address,
            amount,
            sell_token_decimals,
            buy_token_decimals: Some(unit.decimals),
            sell_token_symbol: Some(symbol.to_string()),
            context: self.context,
        }
    }
}

fn registered<'a>(network: Network, chain: &'a NetworkConfig, symbol: &str) -> Result<&'a TokenInfo> {
    chain.token(symbol).ok_or_else(|| Error::UnknownToken {
        network,
        symbol: symbol.to_string(),
    })
}

fn unreadable(token: &Token, err: &Error) -> Position {
    tracing::warn!(symbol = token.symbol(), error = %err, "balance read failed");
    Position::new(
        Balance::new(token.symbol().to_string(), U256::ZERO, token.decimals()),
        QuoteResult::error(format!("{} balance read failed: {err}", token.symbol())),
    )
}
