use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{MarketDataSource, SourceError};
use crate::models::{RawQuote, TickerSymbol};

const QUOTE_SUMMARY_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const YAHOO_REFERER: &str = "https://finance.yahoo.com/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) dividend-screener/1.0";

/// quoteSummary response envelope
#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(default)]
    financial_data: Option<FinancialDataModule>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatisticsModule>,
}

/// Yahoo wraps numbers as `{"raw": 1.23, "fmt": "1.23"}`, or `{}` when missing
#[derive(Debug, Default, Deserialize)]
struct YahooNumber {
    #[serde(default)]
    raw: Option<f64>,
}

fn raw(value: &Option<YahooNumber>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    symbol: Option<String>,
    regular_market_price: Option<YahooNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    dividend_yield: Option<YahooNumber>,
    trailing_annual_dividend_yield: Option<YahooNumber>,
    beta: Option<YahooNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    current_price: Option<YahooNumber>,
    revenue_growth: Option<YahooNumber>,
    earnings_growth: Option<YahooNumber>,
    recommendation_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    trailing_eps: Option<YahooNumber>,
    beta: Option<YahooNumber>,
}

/// Yahoo Finance quoteSummary client.
///
/// Yahoo only answers `quoteSummary` for a session: a cookie set by the
/// consent host plus a crumb token bound to that cookie, sent as the `crumb`
/// query parameter. The crumb is fetched lazily, shared by every worker using
/// the client, and refreshed once when a request comes back 401.
pub struct YahooClient {
    client: Client,
    base_url: Url,
    cookie_url: Url,
    domestic_suffix: String,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    /// Create a new Yahoo client against `base_url` (scheme + host, no path)
    pub fn new(base_url: &str, domestic_suffix: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            cookie_url: Url::parse(DEFAULT_COOKIE_URL)?,
            domestic_suffix: domestic_suffix.to_string(),
            crumb: Mutex::new(None),
        })
    }

    /// Use `cookie_url` instead of fc.yahoo.com to open the session
    pub fn with_cookie_url(mut self, cookie_url: &str) -> Result<Self> {
        self.cookie_url = Url::parse(cookie_url)?;
        Ok(self)
    }

    fn quote_summary_url(&self, provider_symbol: &str, crumb: &str) -> Result<Url, SourceError> {
        let mut url = self
            .base_url
            .join(&format!("/v10/finance/quoteSummary/{}", provider_symbol))
            .map_err(|e| SourceError::Transient(format!("invalid quote url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("modules", QUOTE_SUMMARY_MODULES)
            .append_pair("crumb", crumb);
        Ok(url)
    }

    /// Cached crumb, opening a session first if there is none
    async fn crumb(&self) -> Result<String, SourceError> {
        // Held across the refresh so concurrent workers wait for one handshake
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.open_session().await?;
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// Drop `stale` unless another worker already replaced it
    async fn invalidate_crumb(&self, stale: &str) {
        let mut cached = self.crumb.lock().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    async fn open_session(&self) -> Result<String, SourceError> {
        debug!("Opening Yahoo session via {}", self.cookie_url);

        // The consent host answers 404 but still sets the session cookie
        self.client
            .get(self.cookie_url.clone())
            .header(REFERER, YAHOO_REFERER)
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("failed to fetch Yahoo cookie: {}", e)))?;

        let crumb_url = self
            .base_url
            .join("/v1/test/getcrumb")
            .map_err(|e| SourceError::Transient(format!("invalid crumb url: {}", e)))?;
        let response = self
            .client
            .get(crumb_url)
            .header(REFERER, YAHOO_REFERER)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Throttled);
        }
        if !status.is_success() {
            return Err(SourceError::Transient(format!(
                "crumb request failed with status {}",
                status
            )));
        }

        let body = response.text().await?;
        let crumb = parse_crumb(&body)?;
        info!("Yahoo session established");
        Ok(crumb)
    }

    async fn request_quote(
        &self,
        provider_symbol: &str,
        crumb: &str,
    ) -> Result<reqwest::Response, SourceError> {
        let url = self.quote_summary_url(provider_symbol, crumb)?;
        debug!("Making request to: {}", url);
        Ok(self.client.get(url).send().await?)
    }
}

/// Validate a getcrumb body: a short token, never an HTML page
fn parse_crumb(body: &str) -> Result<String, SourceError> {
    let crumb = body.trim();
    let looks_valid = !crumb.is_empty()
        && crumb.len() < 100
        && !crumb.contains(char::is_whitespace)
        && !crumb.contains('<');

    if looks_valid {
        Ok(crumb.to_string())
    } else {
        Err(SourceError::Transient("unexpected crumb response".to_string()))
    }
}

/// Map a quoteSummary body to provider-native values. A response with no
/// result yields a quote with no symbol, which callers treat as unconfirmed.
pub fn parse_quote_summary(body: &str) -> Result<RawQuote, SourceError> {
    let response: QuoteSummaryResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Transient(format!("failed to parse quoteSummary: {}", e)))?;

    if let Some(error) = response.quote_summary.error.filter(|e| !e.is_null()) {
        return Err(SourceError::Transient(format!("quoteSummary error: {}", error)));
    }

    let result = match response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
    {
        Some(result) => result,
        None => return Ok(RawQuote::default()),
    };

    let price = result.price.unwrap_or_default();
    let summary = result.summary_detail.unwrap_or_default();
    let financial = result.financial_data.unwrap_or_default();
    let stats = result.default_key_statistics.unwrap_or_default();

    Ok(RawQuote {
        symbol: price.symbol,
        current_price: raw(&financial.current_price).or_else(|| raw(&price.regular_market_price)),
        dividend_yield: raw(&summary.dividend_yield)
            .or_else(|| raw(&summary.trailing_annual_dividend_yield)),
        beta: raw(&summary.beta).or_else(|| raw(&stats.beta)),
        revenue_growth: raw(&financial.revenue_growth),
        earnings_growth: raw(&financial.earnings_growth),
        trailing_eps: raw(&stats.trailing_eps),
        recommendation_key: financial.recommendation_key,
    })
}

#[async_trait]
impl MarketDataSource for YahooClient {
    fn provider_symbol(&self, ticker: &TickerSymbol) -> String {
        ticker.provider_symbol(&self.domestic_suffix)
    }

    async fn fetch_raw(&self, ticker: &TickerSymbol) -> Result<RawQuote, SourceError> {
        let provider_symbol = self.provider_symbol(ticker);

        let crumb = self.crumb().await?;
        let mut response = self.request_quote(&provider_symbol, &crumb).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Crumb rejected for {}, refreshing session", ticker);
            self.invalidate_crumb(&crumb).await;
            let crumb = self.crumb().await?;
            response = self.request_quote(&provider_symbol, &crumb).await?;
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Throttled);
        }
        if !status.is_success() {
            return Err(SourceError::Transient(format!(
                "quoteSummary request for {} failed with status {}",
                ticker.symbol(),
                status
            )));
        }

        let body = response.text().await?;
        parse_quote_summary(&body)
    }
}
