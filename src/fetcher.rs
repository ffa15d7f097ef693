//! Throttled, throttle-aware snapshot fetching
//!
//! A [`SnapshotFetcher`] belongs to a single worker: it owns that worker's
//! throttle, so the aggregate request rate of a pool is
//! `worker_count / throttle_delay`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{MarketDataSource, SourceError, Throttle};
use crate::error::ScreeningError;
use crate::models::{MarketSnapshot, TickerSymbol};

/// Bounded exponential backoff applied when the provider throttles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub factor: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_secs(5),
            factor: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Same delay before every retry
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_backoff: delay,
            factor: 1.0,
            max_backoff: delay,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * factor^attempt`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        let seconds = self.base_backoff.as_secs_f64() * scale;
        let capped = seconds.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

pub struct SnapshotFetcher {
    source: Arc<dyn MarketDataSource>,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl SnapshotFetcher {
    pub fn new(source: Arc<dyn MarketDataSource>, throttle_delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            source,
            throttle: Throttle::new(throttle_delay),
            retry,
        }
    }

    /// Fetch and normalize one ticker's snapshot.
    ///
    /// Throttled requests are retried per the [`RetryPolicy`]; once retries are
    /// exhausted the ticker is reported as [`ScreeningError::RateLimited`].
    /// Any other failure, or a payload that does not confirm the ticker's
    /// identity, is [`ScreeningError::TransientFetch`] without retry.
    pub async fn fetch(&self, ticker: &TickerSymbol) -> Result<MarketSnapshot, ScreeningError> {
        let mut attempt: u32 = 0;

        loop {
            self.throttle.wait().await;

            match self.source.fetch_raw(ticker).await {
                Ok(raw) => {
                    let expected = self.source.provider_symbol(ticker);
                    return match raw.symbol.as_deref() {
                        Some(echoed) if echoed.trim().eq_ignore_ascii_case(&expected) => {
                            debug!("Fetched snapshot for {}", ticker);
                            Ok(MarketSnapshot::from_raw(ticker.clone(), &raw))
                        }
                        Some(echoed) => Err(self.unavailable(
                            ticker,
                            format!("provider answered for {}", echoed),
                        )),
                        None => Err(self.unavailable(ticker, "no symbol in response".to_string())),
                    };
                }
                Err(SourceError::Throttled) => {
                    if attempt >= self.retry.max_retries {
                        warn!(
                            "{} still throttled after {} attempts, giving up",
                            ticker,
                            attempt + 1
                        );
                        return Err(ScreeningError::RateLimited {
                            symbol: ticker.symbol().to_string(),
                            attempts: attempt + 1,
                        });
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!("{} throttled, retrying in {:?}", ticker, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(SourceError::Transient(reason)) => {
                    return Err(self.unavailable(ticker, reason));
                }
            }
        }
    }

    fn unavailable(&self, ticker: &TickerSymbol, reason: String) -> ScreeningError {
        warn!("Skipping {}: {}", ticker, reason);
        ScreeningError::TransientFetch {
            symbol: ticker.symbol().to_string(),
            reason,
        }
    }
}
