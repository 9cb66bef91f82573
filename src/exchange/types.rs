use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// How a market order is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSize {
    /// Units of the base asset.
    Quantity(Decimal),
    /// Dollar value.
    Notional(Decimal),
}

impl OrderSize {
    pub fn amount(&self) -> Decimal {
        match self {
            OrderSize::Quantity(v) | OrderSize::Notional(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketOrderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_amount: Option<Decimal>,
}

impl From<OrderSize> for MarketOrderConfig {
    fn from(size: OrderSize) -> Self {
        match size {
            OrderSize::Quantity(q) => Self {
                asset_quantity: Some(q),
                quote_amount: None,
            },
            OrderSize::Notional(n) => Self {
                asset_quantity: None,
                quote_amount: Some(n),
            },
        }
    }
}

/// Body of `POST /api/v1/crypto/trading/orders/`. Serialized in declaration
/// order; that exact string is what gets signed and sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketOrderBody {
    pub client_order_id: Uuid,
    pub side: Side,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub market_order_config: MarketOrderConfig,
}

impl MarketOrderBody {
    pub fn new(side: Side, symbol: &str, size: OrderSize) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            side,
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            market_order_config: size.into(),
        }
    }
}

/// Paginated list envelope used by the trading endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BestBidAsk {
    pub symbol: String,
    #[serde(alias = "bid_inclusive_of_sell_spread")]
    pub bid_price: Decimal,
    #[serde(alias = "ask_inclusive_of_buy_spread")]
    pub ask_price: Decimal,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub timestamp: String,
}

impl Quote {
    /// `fetched_at` is used when the venue omits its own timestamp.
    pub fn from_best_bid_ask(raw: BestBidAsk, fetched_at: String) -> Self {
        let mid = (raw.bid_price + raw.ask_price) / Decimal::TWO;
        Self {
            symbol: raw.symbol,
            bid: raw.bid_price,
            ask: raw.ask_price,
            mid,
            timestamp: raw.timestamp.unwrap_or(fetched_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset_code: String,
    pub total_quantity: Decimal,
    pub quantity_available_for_trading: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub status: String,
    pub buying_power: Decimal,
    pub buying_power_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub side: Side,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub state: String,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub filled_asset_quantity: Option<Decimal>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Error payload returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub attr: Option<String>,
    pub detail: String,
}

impl ApiErrorBody {
    pub fn summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| match &e.attr {
                Some(attr) => format!("{}: {}", attr, e.detail),
                None => e.detail.clone(),
            })
            .collect();
        Some(parts.join("; "))
    }
}
