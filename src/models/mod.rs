use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetcher::RetryPolicy;
use crate::pipeline::PipelineConfig;

pub mod criteria;
pub use criteria::{PeBand, ScoringWeights, ScreeningCriteria};

/// Market a ticker is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Domestic,
    Foreign,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Domestic => "domestic",
            Market::Foreign => "foreign",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domestic" | "b3" | "br" => Ok(Market::Domestic),
            "foreign" | "intl" | "us" => Ok(Market::Foreign),
            other => Err(anyhow::anyhow!("unknown market tag: {}", other)),
        }
    }
}

/// Ticker symbol tagged with its market
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickerSymbol {
    symbol: String,
    market: Market,
}

impl TickerSymbol {
    pub fn new(symbol: impl AsRef<str>, market: Market) -> Self {
        Self {
            symbol: symbol.as_ref().trim().to_ascii_uppercase(),
            market,
        }
    }

    pub fn domestic(symbol: impl AsRef<str>) -> Self {
        Self::new(symbol, Market::Domestic)
    }

    pub fn foreign(symbol: impl AsRef<str>) -> Self {
        Self::new(symbol, Market::Foreign)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Symbol as the quote provider knows it. Domestic listings carry the
    /// exchange suffix (e.g. `PETR4` -> `PETR4.SA`).
    pub fn provider_symbol(&self, domestic_suffix: &str) -> String {
        match self.market {
            Market::Domestic => format!("{}{}", self.symbol, domestic_suffix),
            Market::Foreign => self.symbol.clone(),
        }
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.market)
    }
}

/// Analyst consensus as reported by the quote provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKey {
    StrongBuy,
    Buy,
    Hold,
    Underperform,
    Sell,
    StrongSell,
    NotAvailable,
}

impl Default for RecommendationKey {
    fn default() -> Self {
        RecommendationKey::NotAvailable
    }
}

impl RecommendationKey {
    /// Total mapping from the provider's key; anything outside the vocabulary
    /// (including "none") is `NotAvailable`.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strong_buy" => RecommendationKey::StrongBuy,
            "buy" => RecommendationKey::Buy,
            "hold" => RecommendationKey::Hold,
            "underperform" => RecommendationKey::Underperform,
            "sell" => RecommendationKey::Sell,
            "strong_sell" => RecommendationKey::StrongSell,
            _ => RecommendationKey::NotAvailable,
        }
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::PtBr => match self {
                RecommendationKey::StrongBuy => "Compra Forte",
                RecommendationKey::Buy => "Compra",
                RecommendationKey::Hold => "Manter",
                RecommendationKey::Underperform => "Desempenho Inferior",
                RecommendationKey::Sell => "Venda",
                RecommendationKey::StrongSell => "Venda Forte",
                RecommendationKey::NotAvailable => "Não disponível",
            },
            Locale::En => match self {
                RecommendationKey::StrongBuy => "Strong Buy",
                RecommendationKey::Buy => "Buy",
                RecommendationKey::Hold => "Hold",
                RecommendationKey::Underperform => "Underperform",
                RecommendationKey::Sell => "Sell",
                RecommendationKey::StrongSell => "Strong Sell",
                RecommendationKey::NotAvailable => "Not available",
            },
        }
    }
}

/// Language used for recommendation labels in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    PtBr,
    En,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pt-br" | "pt_br" | "pt" => Ok(Locale::PtBr),
            "en" | "en-us" | "en_us" => Ok(Locale::En),
            other => Err(anyhow::anyhow!("unsupported locale: {}", other)),
        }
    }
}

/// Provider-native quote values, before normalization. Yield and growth
/// figures are fractions (0.05 == 5%).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuote {
    pub symbol: Option<String>,
    pub current_price: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub recommendation_key: Option<String>,
}

/// Point-in-time values for one ticker, in percentages where applicable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub ticker: TickerSymbol,
    pub current_price: Option<f64>,
    pub dividend_yield: f64,
    pub beta: f64,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub recommendation: RecommendationKey,
}

impl MarketSnapshot {
    /// Normalize a provider quote. Absent yield defaults to 0, absent beta
    /// to 1; non-finite numbers count as absent.
    pub fn from_raw(ticker: TickerSymbol, raw: &RawQuote) -> Self {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let percent = |v: Option<f64>| finite(v).map(|x| x * 100.0);

        Self {
            ticker,
            current_price: finite(raw.current_price),
            dividend_yield: percent(raw.dividend_yield).unwrap_or(0.0),
            beta: finite(raw.beta).unwrap_or(1.0),
            revenue_growth: percent(raw.revenue_growth),
            earnings_growth: percent(raw.earnings_growth),
            trailing_eps: finite(raw.trailing_eps),
            recommendation: raw
                .recommendation_key
                .as_deref()
                .map(RecommendationKey::from_key)
                .unwrap_or_default(),
        }
    }

    pub fn market(&self) -> Market {
        self.ticker.market()
    }
}

/// A ticker that passed every eligibility filter, with its derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub snapshot: MarketSnapshot,
    pub pe_ratio: Option<f64>,
    pub annual_dividend_return: f64,
    pub recommendation_label: String,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn ticker(&self) -> &TickerSymbol {
        &self.snapshot.ticker
    }
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub universe_size: usize,
    pub scored: usize,
    pub ineligible: usize,
    pub unavailable: usize,
    pub rate_limited: usize,
    pub cancelled: usize,
}

impl RunStats {
    pub fn absorb(&mut self, other: &RunStats) {
        self.scored += other.scored;
        self.ineligible += other.ineligible;
        self.unavailable += other.unavailable;
        self.rate_limited += other.rate_limited;
        self.cancelled += other.cancelled;
    }
}

/// Ranked output of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningResult {
    pub generated_at: DateTime<Utc>,
    pub candidates: Vec<ScoredCandidate>,
    pub stats: RunStats,
}

impl ScreeningResult {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            candidates: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Where the ticker universe comes from
#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSource {
    /// Fixed ticker list
    Static(Vec<TickerSymbol>),
    /// One CSV directory URL per market
    Remote(Vec<(Market, String)>),
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub criteria: ScreeningCriteria,
    pub weights: ScoringWeights,
    pub pipeline: PipelineConfig,
    pub locale: Locale,
    pub domestic_suffix: String,
    pub yahoo_base_url: String,
    pub yahoo_cookie_url: String,
    pub universe: UniverseSource,
    pub schedule: Vec<NaiveTime>,
    pub report_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            criteria: ScreeningCriteria::default(),
            weights: ScoringWeights::default(),
            pipeline: PipelineConfig::default(),
            locale: Locale::default(),
            domestic_suffix: ".SA".to_string(),
            yahoo_base_url: "https://query2.finance.yahoo.com".to_string(),
            yahoo_cookie_url: "https://fc.yahoo.com".to_string(),
            universe: UniverseSource::Static(Vec::new()),
            schedule: vec![NaiveTime::from_hms_opt(23, 16, 0).unwrap_or_default()],
            report_path: "relatorio_acoes.csv".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unparsable numeric
    /// values fall back to defaults; malformed schedules, ticker lists and
    /// locales are rejected.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(profile) = lookup("SCREENER_PROFILE") {
            config.criteria = match profile.trim().to_ascii_lowercase().as_str() {
                "basic" => ScreeningCriteria::basic(),
                "relaxed" => ScreeningCriteria::relaxed(),
                other => return Err(anyhow::anyhow!("unknown SCREENER_PROFILE: {}", other)),
            };
        }

        let criteria = &mut config.criteria;
        criteria.min_dividend_yield =
            parse_or(&lookup, "SCREENER_MIN_DIVIDEND_YIELD", criteria.min_dividend_yield);
        if let Some(max_beta) = lookup("SCREENER_MAX_BETA") {
            criteria.max_beta = match max_beta.trim() {
                "none" | "" => None,
                value => value.parse().ok().or(criteria.max_beta),
            };
        }
        if let Some(band) = criteria.pe_band {
            criteria.pe_band = Some(PeBand {
                min: parse_or(&lookup, "SCREENER_PE_MIN", band.min),
                max: parse_or(&lookup, "SCREENER_PE_MAX", band.max),
            });
        }
        criteria.require_revenue_growth = parse_or(
            &lookup,
            "SCREENER_REQUIRE_REVENUE_GROWTH",
            criteria.require_revenue_growth,
        );

        let pipeline = &mut config.pipeline;
        pipeline.worker_count = parse_or(&lookup, "SCREENER_WORKERS", pipeline.worker_count);
        pipeline.throttle_delay = Duration::from_millis(parse_or(
            &lookup,
            "SCREENER_THROTTLE_MS",
            pipeline.throttle_delay.as_millis() as u64,
        ));
        pipeline.retry = RetryPolicy {
            base_backoff: Duration::from_millis(parse_or(
                &lookup,
                "SCREENER_RETRY_BACKOFF_MS",
                pipeline.retry.base_backoff.as_millis() as u64,
            )),
            max_retries: parse_or(&lookup, "SCREENER_MAX_RETRIES", pipeline.retry.max_retries),
            ..pipeline.retry
        };

        if let Some(locale) = lookup("SCREENER_LOCALE") {
            config.locale = locale.parse()?;
        }
        if let Some(suffix) = lookup("SCREENER_DOMESTIC_SUFFIX") {
            config.domestic_suffix = suffix.trim().to_string();
        }
        if let Some(base_url) = lookup("YAHOO_BASE_URL") {
            config.yahoo_base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(cookie_url) = lookup("YAHOO_COOKIE_URL") {
            config.yahoo_cookie_url = cookie_url.trim().to_string();
        }
        if let Some(path) = lookup("SCREENER_REPORT_PATH") {
            config.report_path = path;
        }

        config.universe = match lookup("SCREENER_TICKERS") {
            Some(list) => UniverseSource::Static(parse_ticker_list(&list)?),
            None => {
                let remote: Vec<(Market, String)> = [
                    (Market::Domestic, "SCREENER_DOMESTIC_UNIVERSE_URL"),
                    (Market::Foreign, "SCREENER_FOREIGN_UNIVERSE_URL"),
                ]
                .into_iter()
                .filter_map(|(market, key)| lookup(key).map(|url| (market, url)))
                .collect();
                if remote.is_empty() {
                    UniverseSource::Static(Vec::new())
                } else {
                    UniverseSource::Remote(remote)
                }
            }
        };

        if let Some(schedule) = lookup("SCREENER_SCHEDULE") {
            config.schedule = parse_schedule(&schedule)?;
        }

        Ok(config)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse `PETR4, VALE3, AAPL:foreign` into tickers. Untagged entries are
/// domestic; repeated entries keep their first position.
pub fn parse_ticker_list(list: &str) -> anyhow::Result<Vec<TickerSymbol>> {
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let ticker = match entry.split_once(':') {
            Some((symbol, market)) => TickerSymbol::new(symbol, market.parse()?),
            None => TickerSymbol::domestic(entry),
        };
        if seen.insert(ticker.clone()) {
            tickers.push(ticker);
        }
    }

    Ok(tickers)
}

/// Parse a comma-separated list of `HH:MM` daily run times
pub fn parse_schedule(schedule: &str) -> anyhow::Result<Vec<NaiveTime>> {
    let mut times = schedule
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            NaiveTime::parse_from_str(entry, "%H:%M")
                .map_err(|e| anyhow::anyhow!("invalid schedule time '{}': {}", entry, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    times.sort();
    times.dedup();
    Ok(times)
}
