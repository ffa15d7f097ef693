//! Ranking order of scored candidates

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::test_data::{domestic, eligible_quote, foreign};
use dividend_screener::models::{MarketSnapshot, ScoredCandidate, TickerSymbol};
use dividend_screener::pipeline::{compare_candidates, rank_candidates};
use std::cmp::Ordering;

fn scored(ticker: TickerSymbol, score: f64, beta: f64) -> ScoredCandidate {
    let mut snapshot = MarketSnapshot::from_raw(ticker, &eligible_quote("ANY"));
    snapshot.beta = beta;
    ScoredCandidate {
        snapshot,
        pe_ratio: Some(10.0),
        annual_dividend_return: 4.0,
        recommendation_label: "Compra".to_string(),
        score,
    }
}

#[test]
fn test_same_symbol_in_both_markets_orders_domestic_first() {
    let a = scored(foreign("ITUB"), 20.0, 0.9);
    let b = scored(domestic("ITUB"), 20.0, 0.9);

    assert_eq!(compare_candidates(&b, &a), Ordering::Less);
}

#[test]
fn test_ranking_is_independent_of_input_order() {
    let build = || {
        vec![
            scored(domestic("BBAS3"), 18.0, 1.1),
            scored(foreign("VZ"), 25.0, 0.4),
            scored(domestic("CMIG4"), 18.0, 0.6),
            scored(foreign("T"), 18.0, 0.6),
        ]
    };

    let mut forward = build();
    let mut backward = build();
    backward.reverse();
    rank_candidates(&mut forward);
    rank_candidates(&mut backward);

    let order = |c: &[ScoredCandidate]| -> Vec<String> {
        c.iter().map(|c| c.ticker().symbol().to_string()).collect()
    };
    assert_eq!(order(&forward), vec!["VZ", "CMIG4", "T", "BBAS3"]);
    assert_eq!(order(&forward), order(&backward));
}
