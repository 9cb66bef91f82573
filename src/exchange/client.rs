use std::time::Instant;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::config::{Config, Credentials};
use crate::error::{ClientError, Result};
use crate::exchange::signing::{HttpMethod, SignedRequestBuilder};
use crate::exchange::transport::{HttpTransport, RawResponse, Transport};
use crate::exchange::types::{
    Account, ApiErrorBody, BestBidAsk, Holding, MarketOrderBody, Order, OrderSize, Page, Quote,
    Side,
};
use crate::logging::{log_order_ack, log_order_submit, log_quote, log_request, ts_now};

pub const BEST_BID_ASK_PATH: &str = "/api/v1/crypto/marketdata/best_bid_ask/";
pub const ACCOUNTS_PATH: &str = "/api/v1/crypto/trading/accounts/";
pub const HOLDINGS_PATH: &str = "/api/v1/crypto/trading/holdings/";
pub const ORDERS_PATH: &str = "/api/v1/crypto/trading/orders/";

/// One signed request per call, awaited before returning. No retries.
pub struct TradingClient {
    config: Config,
    builder: SignedRequestBuilder,
    transport: Box<dyn Transport>,
}

impl TradingClient {
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::new(config.timeout_secs)?;
        Ok(Self::with_transport(config, credentials, Box::new(transport)))
    }

    pub fn with_transport(
        config: Config,
        credentials: Credentials,
        transport: Box<dyn Transport>,
    ) -> Self {
        let builder = SignedRequestBuilder::new(credentials, config.layout);
        Self {
            config,
            builder,
            transport,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &str,
    ) -> Result<T> {
        let signed = self.builder.build(method, path, body)?;
        let started = Instant::now();
        let result = self.transport.send(&self.config.base_url, &signed).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                log_request(method.as_str(), path, None, elapsed_ms);
                return Err(err);
            }
        };
        log_request(method.as_str(), path, Some(resp.status), elapsed_ms);

        if !resp.is_success() {
            return Err(api_error(resp));
        }
        serde_json::from_str(&resp.body)
            .map_err(|e| ClientError::Decode(format!("{}: {}", path, e)))
    }

    pub async fn get_price(&self, symbol: &str) -> Result<Quote> {
        validate_symbol(symbol)?;
        let path = with_query(BEST_BID_ASK_PATH, &[("symbol", symbol)]);
        let page: Page<BestBidAsk> = self.request(HttpMethod::Get, &path, "").await?;
        let raw = page
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode(format!("no quote returned for {}", symbol)))?;
        let quote = Quote::from_best_bid_ask(raw, ts_now());
        log_quote(&quote.symbol, &quote.bid.to_string(), &quote.ask.to_string());
        Ok(quote)
    }

    pub async fn get_holdings(&self, asset_code: &str) -> Result<Vec<Holding>> {
        validate_symbol(asset_code)?;
        let path = with_query(HOLDINGS_PATH, &[("asset_code", asset_code)]);
        let page: Page<Holding> = self.request(HttpMethod::Get, &path, "").await?;
        Ok(page.results)
    }

    pub async fn get_account(&self) -> Result<Account> {
        self.request(HttpMethod::Get, ACCOUNTS_PATH, "").await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        if order_id.is_empty()
            || !order_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ClientError::Validation(format!("invalid order id {:?}", order_id)));
        }
        let path = format!("{}{}/", ORDERS_PATH, order_id);
        self.request(HttpMethod::Get, &path, "").await
    }

    /// Market order on the configured symbol. Rejects non-positive sizes
    /// before anything is signed or sent.
    pub async fn place_market_order(&self, side: Side, size: OrderSize) -> Result<Order> {
        if size.amount() <= Decimal::ZERO {
            return Err(ClientError::Validation(format!(
                "order amount must be positive, got {}",
                size.amount()
            )));
        }
        validate_symbol(&self.config.symbol)?;

        let body = MarketOrderBody::new(side, &self.config.symbol, size);
        let encoded = serde_json::to_string(&body)?;
        log_order_submit(
            &body.client_order_id.to_string(),
            &body.symbol,
            side.as_str(),
            &size.amount().to_string(),
        );

        let order: Order = self.request(HttpMethod::Post, ORDERS_PATH, &encoded).await?;
        log_order_ack(&order.id, &order.state);
        Ok(order)
    }

    pub async fn buy(&self, size: OrderSize) -> Result<Order> {
        self.place_market_order(Side::Buy, size).await
    }

    /// Sell everything available for trading in the configured asset.
    /// `None` when there is nothing to sell.
    pub async fn sell(&self) -> Result<Option<Order>> {
        let asset = self.config.asset_code().to_string();
        let holdings = self.get_holdings(&asset).await?;
        let available = holdings
            .iter()
            .find(|h| h.asset_code.eq_ignore_ascii_case(&asset))
            .map(|h| h.quantity_available_for_trading)
            .unwrap_or(Decimal::ZERO);

        if available <= Decimal::ZERO {
            return Ok(None);
        }
        self.place_market_order(Side::Sell, OrderSize::Quantity(available))
            .await
            .map(Some)
    }
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        query.append_pair(k, v);
    }
    format!("{}?{}", path, query.finish())
}

fn validate_symbol(symbol: &str) -> Result<()> {
    let ok = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ClientError::Validation(format!("invalid symbol {:?}", symbol)))
    }
}

fn api_error(resp: RawResponse) -> ClientError {
    let message = serde_json::from_str::<ApiErrorBody>(&resp.body)
        .ok()
        .and_then(|b| b.summary())
        .unwrap_or_else(|| {
            let trimmed = resp.body.trim();
            if trimmed.is_empty() {
                reqwest::StatusCode::from_u16(resp.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });
    ClientError::Api {
        status: resp.status,
        message,
    }
}
