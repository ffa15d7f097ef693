use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::TickerUniverseProvider;
use crate::error::ScreeningError;
use crate::models::{Market, TickerSymbol};

/// Fixed ticker list, typically from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    tickers: Vec<TickerSymbol>,
}

impl StaticUniverse {
    pub fn new(tickers: Vec<TickerSymbol>) -> Self {
        Self { tickers }
    }
}

#[async_trait]
impl TickerUniverseProvider for StaticUniverse {
    async fn list(&self) -> Result<Vec<TickerSymbol>, ScreeningError> {
        Ok(self.tickers.clone())
    }
}

/// Ticker directories published as CSV, one per market. The first column of
/// each row is the symbol; the header row is skipped.
pub struct CsvUniverseProvider {
    client: Client,
    sources: Vec<(Market, String)>,
}

impl CsvUniverseProvider {
    pub fn new(sources: Vec<(Market, String)>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("dividend-screener/1.0")
            .build()?;

        Ok(Self { client, sources })
    }

    async fn download(&self, url: &str) -> Result<String, ScreeningError> {
        let unavailable = |e: reqwest::Error| {
            ScreeningError::UpstreamUnavailable(format!("{}: {}", url, e))
        };

        let response = self.client.get(url).send().await.map_err(unavailable)?;
        let response = response.error_for_status().map_err(unavailable)?;
        response.text().await.map_err(unavailable)
    }
}

/// Parse one CSV directory into tickers for `market`, dropping blank and
/// repeated symbols.
pub fn parse_directory(csv_text: &str, market: Market) -> Result<Vec<TickerSymbol>, ScreeningError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| {
            ScreeningError::UpstreamUnavailable(format!("malformed ticker directory: {}", e))
        })?;
        let symbol = match record.get(0).map(str::trim) {
            Some(symbol) if !symbol.is_empty() => symbol,
            _ => continue,
        };

        let ticker = TickerSymbol::new(symbol, market);
        if seen.insert(ticker.symbol().to_string()) {
            tickers.push(ticker);
        }
    }

    Ok(tickers)
}

#[async_trait]
impl TickerUniverseProvider for CsvUniverseProvider {
    async fn list(&self) -> Result<Vec<TickerSymbol>, ScreeningError> {
        let mut universe = Vec::new();

        for (market, url) in &self.sources {
            debug!("Fetching {} ticker directory from {}", market, url);
            let csv_text = self.download(url).await?;
            let tickers = parse_directory(&csv_text, *market)?;
            info!("Parsed {} {} tickers", tickers.len(), market);
            universe.extend(tickers);
        }

        Ok(universe)
    }
}
