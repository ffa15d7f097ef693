//! Dividend stock screener
//!
//! Screens a universe of equity tickers against dividend, risk and valuation
//! criteria, scores the survivors and produces a ranked report.

pub mod api;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod scorer;

pub use error::ScreeningError;
pub use pipeline::{CancellationFlag, PipelineConfig, ScreeningPipeline};
pub use scheduler::ReportTrigger;
pub use scorer::Scorer;
