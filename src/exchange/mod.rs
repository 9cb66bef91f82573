mod client;
pub mod signing;
pub mod transport;
pub mod types;

pub use client::{
    TradingClient, ACCOUNTS_PATH, BEST_BID_ASK_PATH, HOLDINGS_PATH, ORDERS_PATH,
};
pub use signing::{
    verify_signed_request, HttpMethod, MessageLayout, SignedRequest, SignedRequestBuilder,
};
pub use transport::{HttpTransport, RawResponse, Transport};
