//! Client for the CoW Protocol order quote endpoint.
//!
//! Quotes are requested for price discovery only: the zero address is used as
//! owner and receiver and the returned order is never signed.

use alloy::primitives::{Address, B256, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{Config, Network};
use crate::error::{Error, Result};

/// Rejection marker for sell amounts below the protocol's minimum fee.
const FEE_TOO_SMALL: &str = "SellAmountDoesNotCoverFee";

/// Whether a rejected quote failed only because the amount cannot cover fees.
pub fn is_fee_too_small_error(response_body: &str) -> bool {
    response_body.contains(FEE_TOO_SMALL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sell,
    Buy,
}

/// Body of `POST /api/v1/quote`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuoteRequest {
    pub sell_token: Address,
    pub buy_token: Address,
    pub from: Address,
    pub receiver: Address,
    pub valid_to: u32,
    pub app_data: B256,
    pub partially_fillable: bool,
    pub sell_token_balance: &'static str,
    pub buy_token_balance: &'static str,
    pub kind: OrderKind,
    #[serde_as(as = "DisplayFromStr")]
    pub sell_amount_before_fee: U256,
}

impl OrderQuoteRequest {
    /// Sell order for `amount` valid for `validity` from `now`.
    pub fn sell(
        sell_token: Address,
        buy_token: Address,
        amount: U256,
        now: u64,
        validity: Duration,
    ) -> Self {
        let valid_to = now.saturating_add(validity.as_secs()).min(u64::from(u32::MAX)) as u32;
        Self {
            sell_token,
            buy_token,
            from: Address::ZERO,
            receiver: Address::ZERO,
            valid_to,
            app_data: B256::ZERO,
            partially_fillable: false,
            sell_token_balance: "erc20",
            buy_token_balance: "erc20",
            kind: OrderKind::Sell,
            sell_amount_before_fee: amount,
        }
    }

    pub fn with_amount(&self, amount: U256) -> Self {
        Self {
            sell_amount_before_fee: amount,
            ..self.clone()
        }
    }
}

/// The `quote` object of a successful response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    #[serde_as(as = "DisplayFromStr")]
    pub buy_amount: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub sell_amount: U256,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub fee_amount: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_impact: Option<serde_json::Value>,
}

impl OrderQuote {
    pub fn price_impact(&self) -> String {
        match &self.price_impact {
            Some(serde_json::Value::String(value)) => value.clone(),
            Some(serde_json::Value::Null) | None => "0".to_string(),
            Some(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OrderQuoteResponse {
    quote: OrderQuote,
}

/// Outcome of a quote call that reached the API.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteResponse {
    Quoted(OrderQuote),
    /// Non-success status or a body without a quote.
    Rejected { status: u16, body: String },
}

/// Abstract quote API. Provides a mockable implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait QuoteApi: Send + Sync {
    /// Transport failures are errors; anything the API answered is a
    /// [`QuoteResponse`].
    async fn quote(&self, network: Network, request: &OrderQuoteRequest) -> Result<QuoteResponse>;
}

/// CoW Protocol HTTP API client.
#[derive(Debug, Clone)]
pub struct CowApi {
    client: Client,
    endpoints: BTreeMap<Network, String>,
}

impl CowApi {
    pub fn new(client: Client, endpoints: BTreeMap<Network, String>) -> Self {
        Self { client, endpoints }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let endpoints = config
            .networks
            .iter()
            .map(|(network, chain)| (*network, chain.quote_url()))
            .collect();
        Ok(Self::new(client, endpoints))
    }
}

#[async_trait::async_trait]
impl QuoteApi for CowApi {
    async fn quote(&self, network: Network, request: &OrderQuoteRequest) -> Result<QuoteResponse> {
        let url = self
            .endpoints
            .get(&network)
            .ok_or(Error::UnsupportedNetwork(network))?;
        tracing::debug!(%url, ?request, "requesting CoW quote");

        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), %body, "quote rejected");
            return Ok(QuoteResponse::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(parse_quote_body(status.as_u16(), body))
    }
}

fn parse_quote_body(status: u16, body: String) -> QuoteResponse {
    match serde_json::from_str::<OrderQuoteResponse>(&body) {
        Ok(response) => QuoteResponse::Quoted(response.quote),
        Err(err) => {
            tracing::warn!(%err, "unexpected quote response shape");
            QuoteResponse::Rejected { status, body }
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_too_small_detection() {
        let body = r#"{"errorType":"SellAmountDoesNotCoverFee","description":"The sell amount for the sell order is lower than the fee.","data":{"fee_amount":"0x1"}}"#;
        assert!(is_fee_too_small_error(body));
        assert!(is_fee_too_small_error("SellAmountDoesNotCoverFee"));
        assert!(!is_fee_too_small_error(r#"{"errorType":"NoLiquidity"}"#));
        assert!(!is_fee_too_small_error("sellamountdoesnotcoverfee"));
    }

    #[test]
    fn test_request_body() {
        let sell: Address = "0xae7ab96520de3a18e5e111b5eaab095312d7fe84".parse().unwrap();
        let buy: Address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap();
        let request = OrderQuoteRequest::sell(
            sell,
            buy,
            U256::from(1_000_000u64),
            1_700_000_000,
            Duration::from_secs(3600),
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["validTo"], 1_700_003_600);
        assert_eq!(json["kind"], "sell");
        assert_eq!(json["sellAmountBeforeFee"], "1000000");
        assert_eq!(json["partiallyFillable"], false);
        assert_eq!(json["sellTokenBalance"], "erc20");
        assert_eq!(json["buyTokenBalance"], "erc20");
        assert_eq!(
            json["from"].as_str().unwrap().to_lowercase(),
            "0x0000000000000000000000000000000000000000"
        );
        assert_eq!(
            json["appData"],
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        );

        let reference = request.with_amount(U256::from(5u64));
        assert_eq!(reference.sell_amount_before_fee, U256::from(5u64));
        assert_eq!(reference.valid_to, request.valid_to);
    }

    #[test]
    fn test_parse_quote_body() {
        let body = r#"{
            "quote": {
                "sellToken": "0xae7ab96520de3a18e5e111b5eaab095312d7fe84",
                "buyAmount": "2500000",
                "sellAmount": "999000000000000000",
                "feeAmount": "1000000000000000",
                "kind": "sell"
            },
            "from": "0x0000000000000000000000000000000000000000",
            "expiration": "2024-01-01T00:00:00Z",
            "id": 1
        }"#;
        let QuoteResponse::Quoted(quote) = parse_quote_body(200, body.to_string()) else {
            panic!("expected a quote");
        };
        assert_eq!(quote.buy_amount, U256::from(2_500_000u64));
        assert_eq!(quote.fee_amount, U256::from(1_000_000_000_000_000u64));
        assert_eq!(quote.price_impact(), "0");
    }

    #[test]
    fn test_unexpected_body_is_rejected() {
        let response = parse_quote_body(200, r#"{"unexpected": true}"#.to_string());
        assert!(matches!(response, QuoteResponse::Rejected { status: 200, .. }));
    }

    mod http {
        use crate::config::{Config, Network};
        use crate::cow::{is_fee_too_small_error, CowApi, OrderQuoteRequest, QuoteApi, QuoteResponse};
        use crate::error::Error;
        use crate::quote::QuoteService;
        use alloy::primitives::U256;
        use reqwest::Client;
        use std::collections::BTreeMap;
        use std::time::Duration;
        use crate::types::{QuoteRequest, QuoteSource};
        use serde_json::json;
        use std::sync::Arc;
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const STETH: &str = "0xae7ab96520de3a18e5e111b5eaab095312d7fe84";
        const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
        const FEE_ERROR: &str = r#"{"errorType":"SellAmountDoesNotCoverFee","description":"The sell amount for the sell order is lower than the fee.","data":{"fee_amount":"0x1"}}"#;

        fn api(server: &MockServer) -> CowApi {
            let endpoints = BTreeMap::from([(
                Network::Ethereum,
                format!("{}/api/v1/quote", server.uri()),
            )]);
            CowApi::new(Client::new(), endpoints)
        }

        fn order(amount: u64) -> OrderQuoteRequest {
            OrderQuoteRequest::sell(
                STETH.parse().unwrap(),
                WETH.parse().unwrap(),
                U256::from(amount),
                1_700_000_000,
                Duration::from_secs(3600),
            )
        }

        #[tokio::test]
        async fn test_posts_order_and_parses_quote() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/quote"))
                .and(body_partial_json(json!({
                    "kind": "sell",
                    "sellAmountBeforeFee": "1000000",
                    "validTo": 1_700_003_600u32,
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "quote": {
                        "buyAmount": "999000",
                        "sellAmount": "990000",
                        "feeAmount": "10000",
                    }
                })))
                .expect(1)
                .mount(&server)
                .await;

            let response = api(&server).quote(Network::Ethereum, &order(1_000_000)).await.unwrap();
            let QuoteResponse::Quoted(quote) = response else {
                panic!("expected a quote, got {response:?}");
            };
            assert_eq!(quote.buy_amount, U256::from(999_000u64));
            assert_eq!(quote.fee_amount, U256::from(10_000u64));
        }

        #[tokio::test]
        async fn test_error_status_is_a_rejection() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/quote"))
                .respond_with(ResponseTemplate::new(400).set_body_string(FEE_ERROR))
                .mount(&server)
                .await;

            let response = api(&server).quote(Network::Ethereum, &order(1)).await.unwrap();
            let QuoteResponse::Rejected { status, body } = response else {
                panic!("expected a rejection, got {response:?}");
            };
            assert_eq!(status, 400);
            assert!(is_fee_too_small_error(&body));
        }

        #[tokio::test]
        async fn test_unconfigured_network_is_not_requested() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let result = api(&server).quote(Network::Base, &order(1)).await;
            assert!(matches!(result, Err(Error::UnsupportedNetwork(Network::Base))));
        }

        #[tokio::test]
        async fn test_fee_rejection_reaches_the_peg_fallback() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/quote"))
                .respond_with(ResponseTemplate::new(400).set_body_string(FEE_ERROR))
                .expect(1)
                .mount(&server)
                .await;

            let config = Arc::new(Config::load().unwrap());
            let service = QuoteService::new(config, Arc::new(api(&server)));
            let request = QuoteRequest::new(
                Network::Ethereum,
                STETH.parse().unwrap(),
                WETH.parse().unwrap(),
                "1000",
            )
            .unwrap()
            .with_symbol("stETH");

            let result = service.get_quote(&request).await.unwrap();
            assert_eq!(result.source(), QuoteSource::Direct);
            assert_eq!(result.buy_amount, Some(U256::from(1000u64)));
            assert!(result.conversion_details.fallback);
        }
    }
}
