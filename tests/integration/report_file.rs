//! CSV report written to disk

use std::sync::Arc;

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::fakes::ScriptedSource;
use crate::common::fast_pipeline_config;
use crate::common::test_data::{domestic, eligible_quote};
use dividend_screener::api::StaticUniverse;
use dividend_screener::models::ScreeningResult;
use dividend_screener::report::{CsvReportWriter, ReportSink};
use dividend_screener::{Scorer, ScreeningPipeline};

#[test(tokio::test)]
async fn test_report_lists_candidates_in_rank_order() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("relatorio_acoes.csv");

    let source = Arc::new(
        ScriptedSource::new()
            .answer("BBSE3", eligible_quote("BBSE3.SA"))
            .answer(
                "TAEE11",
                dividend_screener::models::RawQuote {
                    recommendation_key: Some("strong_buy".to_string()),
                    ..eligible_quote("TAEE11.SA")
                },
            ),
    );
    let pipeline = ScreeningPipeline::new(
        Arc::new(StaticUniverse::new(vec![domestic("BBSE3"), domestic("TAEE11")])),
        source,
        Scorer::default(),
        fast_pipeline_config(2),
    );
    let result = pipeline.run().await;

    let writer = CsvReportWriter::new(&report_path);
    writer.deliver(&result).await.unwrap();

    let contents = std::fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Ticker,Market,Price,Dividend Yield (%)"));
    assert!(lines[1].starts_with("TAEE11,domestic,40.0,10.0,"));
    assert!(lines[1].ends_with(",Compra Forte,23.0"));
    assert!(lines[2].ends_with(",Compra,13.0"));
}

#[test(tokio::test)]
async fn test_empty_result_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("relatorio_acoes.csv");

    let writer = CsvReportWriter::new(&report_path);
    writer
        .deliver(&ScreeningResult::empty(chrono::Utc::now()))
        .await
        .unwrap();

    assert!(!report_path.exists());
}
