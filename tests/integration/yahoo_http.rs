//! Yahoo quoteSummary client against a local mock server

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use test_log::test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::test_data::{domestic, foreign};
use dividend_screener::api::{MarketDataSource, SourceError, YahooClient};
use dividend_screener::fetcher::{RetryPolicy, SnapshotFetcher};
use dividend_screener::models::RecommendationKey;
use dividend_screener::ScreeningError;

const QUOTE_PATH: &str = "/v10/finance/quoteSummary/BBSE3.SA";

fn bbse3_body() -> String {
    r#"{
        "quoteSummary": {
            "result": [{
                "price": {"symbol": "BBSE3.SA", "regularMarketPrice": {"raw": 33.1, "fmt": "33.10"}},
                "summaryDetail": {"dividendYield": {"raw": 0.0988, "fmt": "9.88%"}, "beta": {"raw": 0.65}},
                "financialData": {
                    "currentPrice": {"raw": 33.46},
                    "revenueGrowth": {"raw": 0.123},
                    "earningsGrowth": {},
                    "recommendationKey": "buy"
                },
                "defaultKeyStatistics": {"trailingEps": {"raw": 3.9}}
            }],
            "error": null
        }
    }"#
    .to_string()
}

/// Session endpoints: cookie host at `/consent`, crumb `abc123`
async fn mount_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/consent"))
        .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=session; Path=/"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("abc123"))
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> YahooClient {
    YahooClient::new(&server.uri(), ".SA")
        .and_then(|client| client.with_cookie_url(&format!("{}/consent", server.uri())))
        .unwrap()
}

#[test(tokio::test)]
async fn test_fetch_raw_maps_quote_summary() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .and(query_param(
            "modules",
            "price,summaryDetail,financialData,defaultKeyStatistics",
        ))
        .and(query_param("crumb", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bbse3_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let raw = client.fetch_raw(&domestic("BBSE3")).await.unwrap();

    assert_eq!(raw.symbol.as_deref(), Some("BBSE3.SA"));
    assert_eq!(raw.current_price, Some(33.46));
    assert_eq!(raw.dividend_yield, Some(0.0988));
    assert_eq!(raw.beta, Some(0.65));
    assert_eq!(raw.earnings_growth, None);
    assert_eq!(raw.recommendation_key.as_deref(), Some("buy"));
}

#[test(tokio::test)]
async fn test_foreign_ticker_has_no_suffix() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/KO"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"quoteSummary": {"result": [{"price": {"symbol": "KO"}}], "error": null}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let raw = client.fetch_raw(&foreign("KO")).await.unwrap();

    assert_eq!(raw.symbol.as_deref(), Some("KO"));
    assert_eq!(raw.dividend_yield, None);
}

#[test(tokio::test)]
async fn test_too_many_requests_is_throttled() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert_eq!(
        client.fetch_raw(&domestic("BBSE3")).await,
        Err(SourceError::Throttled)
    );
}

#[test(tokio::test)]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert_matches!(
        client.fetch_raw(&domestic("BBSE3")).await,
        Err(SourceError::Transient(_))
    );
}

#[test(tokio::test)]
async fn test_fetcher_backs_off_after_429_then_succeeds() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(bbse3_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    let backoff = Duration::from_millis(100);
    let fetcher = SnapshotFetcher::new(client, Duration::ZERO, RetryPolicy::fixed(backoff, 3));

    let start = Instant::now();
    let snapshot = fetcher.fetch(&domestic("BBSE3")).await.unwrap();

    assert!(start.elapsed() >= backoff);
    assert_eq!(snapshot.recommendation, RecommendationKey::Buy);
    assert!((snapshot.dividend_yield - 9.88).abs() < 1e-9);
    assert!((snapshot.revenue_growth.unwrap() - 12.3).abs() < 1e-9);
}

#[test(tokio::test)]
async fn test_fetcher_gives_up_after_retries() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    let fetcher = SnapshotFetcher::new(
        client,
        Duration::ZERO,
        RetryPolicy::fixed(Duration::from_millis(5), 2),
    );

    assert_matches!(
        fetcher.fetch(&domestic("BBSE3")).await,
        Err(ScreeningError::RateLimited { attempts: 3, .. })
    );
}

#[test(tokio::test)]
async fn test_session_is_opened_once_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consent"))
        .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=session; Path=/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("abc123\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .and(query_param("crumb", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bbse3_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert!(client.fetch_raw(&domestic("BBSE3")).await.is_ok());
    assert!(client.fetch_raw(&domestic("BBSE3")).await.is_ok());
}

#[test(tokio::test)]
async fn test_rejected_crumb_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consent"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .and(query_param("crumb", "expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .and(query_param("crumb", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bbse3_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let raw = client.fetch_raw(&domestic("BBSE3")).await.unwrap();

    assert_eq!(raw.symbol.as_deref(), Some("BBSE3.SA"));
}

#[test(tokio::test)]
async fn test_persistent_unauthorized_is_transient() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert_matches!(
        client.fetch_raw(&domestic("BBSE3")).await,
        Err(SourceError::Transient(_))
    );
}

#[test(tokio::test)]
async fn test_html_crumb_page_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>consent</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(bbse3_body()))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert_matches!(
        client.fetch_raw(&domestic("BBSE3")).await,
        Err(SourceError::Transient(_))
    );
}
