//! HTTP clients for the prediction market's gamma and CLOB endpoints.

pub mod auth;
pub mod clob;
pub mod gamma;
pub mod http;

pub use auth::{ApiCredentials, AuthSession};
pub use clob::{ClobClient, OrderBook, OrderRequest};
pub use gamma::{CatalogMarket, GammaClient};
pub use http::HttpFetcher;
