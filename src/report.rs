//! Report generation for screening results
//!
//! The pipeline hands its [`ScreeningResult`] to a [`ReportSink`]. The bundled
//! sink writes a CSV file; mail or upload transports plug in behind the same
//! trait.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::models::{ScoredCandidate, ScreeningResult};

/// Receives the result of every scheduled run
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, result: &ScreeningResult) -> Result<()>;
}

/// One report line
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    #[serde(rename = "Ticker")]
    ticker: &'a str,
    #[serde(rename = "Market")]
    market: &'a str,
    #[serde(rename = "Price")]
    price: Option<f64>,
    #[serde(rename = "Dividend Yield (%)")]
    dividend_yield: f64,
    #[serde(rename = "Revenue Growth (%)")]
    revenue_growth: Option<f64>,
    #[serde(rename = "Earnings Growth (%)")]
    earnings_growth: Option<f64>,
    #[serde(rename = "Beta")]
    beta: f64,
    #[serde(rename = "P/E")]
    pe_ratio: Option<f64>,
    #[serde(rename = "Annual Return")]
    annual_return: f64,
    #[serde(rename = "Recommendation")]
    recommendation: &'a str,
    #[serde(rename = "Score")]
    score: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl<'a> From<&'a ScoredCandidate> for ReportRow<'a> {
    fn from(candidate: &'a ScoredCandidate) -> Self {
        let snapshot = &candidate.snapshot;
        Self {
            ticker: snapshot.ticker.symbol(),
            market: snapshot.ticker.market().as_str(),
            price: snapshot.current_price.map(round2),
            dividend_yield: round2(snapshot.dividend_yield),
            revenue_growth: snapshot.revenue_growth.map(round2),
            earnings_growth: snapshot.earnings_growth.map(round2),
            beta: round2(snapshot.beta),
            pe_ratio: candidate.pe_ratio.map(round2),
            annual_return: round2(candidate.annual_dividend_return),
            recommendation: &candidate.recommendation_label,
            score: round2(candidate.score),
        }
    }
}

/// Serialize candidates, in ranked order, as CSV with a header row
pub fn write_csv<W: Write>(result: &ScreeningResult, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for candidate in &result.candidates {
        csv_writer.serialize(ReportRow::from(candidate))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes each run's candidates to a CSV file, replacing the previous report
pub struct CsvReportWriter {
    path: PathBuf,
}

impl CsvReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ReportSink for CsvReportWriter {
    async fn deliver(&self, result: &ScreeningResult) -> Result<()> {
        if result.is_empty() {
            info!("No candidates met the criteria, no report written");
            return Ok(());
        }

        let file = std::fs::File::create(&self.path)?;
        write_csv(result, file)?;

        info!(
            "Report with {} candidates (generated {}) saved to {}",
            result.len(),
            result.generated_at.format("%d/%m/%Y %H:%M"),
            self.path.display()
        );
        Ok(())
    }
}
