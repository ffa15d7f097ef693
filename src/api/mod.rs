use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;

use crate::error::ScreeningError;
use crate::models::{RawQuote, TickerSymbol};

pub mod universe;
pub mod yahoo_client;
pub use universe::{CsvUniverseProvider, StaticUniverse};
pub use yahoo_client::YahooClient;

/// Error signal from a market data provider. Throttling is kept distinct so
/// the fetcher can back off instead of giving up.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("request throttled by upstream")]
    Throttled,
    #[error("{0}")]
    Transient(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Transient(err.to_string())
    }
}

/// Provider of per-ticker quote data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Symbol the provider uses for `ticker`, and echoes back in its quotes
    fn provider_symbol(&self, ticker: &TickerSymbol) -> String;

    async fn fetch_raw(&self, ticker: &TickerSymbol) -> Result<RawQuote, SourceError>;
}

/// Provider of the set of tickers to screen
#[async_trait]
pub trait TickerUniverseProvider: Send + Sync {
    async fn list(&self) -> Result<Vec<TickerSymbol>, ScreeningError>;
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Minimum spacing between consecutive calls made by one worker
pub struct Throttle {
    limiter: Option<DirectRateLimiter>,
}

impl Throttle {
    /// A zero delay disables throttling.
    pub fn new(min_delay: Duration) -> Self {
        Self {
            limiter: Quota::with_period(min_delay).map(RateLimiter::direct),
        }
    }

    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
