use thiserror::Error;

use crate::config::Network;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request timed out")]
    Timeout,

    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("contract call reverted: {0}")]
    ContractRevert(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("network {0} is not configured")]
    UnsupportedNetwork(Network),

    #[error("unknown network name {0:?}")]
    UnknownNetwork(String),

    #[error("token {symbol} is not configured on {network}")]
    UnknownToken { network: Network, symbol: String },

    #[error("invalid base-unit amount {0:?}")]
    InvalidAmount(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

impl From<alloy::contract::Error> for Error {
    fn from(err: alloy::contract::Error) -> Self {
        let message = err.to_string();
        if message.contains("revert") {
            Self::ContractRevert(message)
        } else {
            Self::Rpc(message)
        }
    }
}

/// Errors that may succeed when the same operation is attempted again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    // Reverts are retried as well: lagging nodes sometimes answer with stale
    // state that reverts.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Http(_) | Self::ContractRevert(_) | Self::Rpc(_)
        )
    }
}
