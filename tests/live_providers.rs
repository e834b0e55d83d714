mod common;

use common::entity;
use stockpile::providers::alpha_vantage::AlphaVantage;
use stockpile::providers::sec::SecEdgar;
use stockpile::providers::yahoo::YahooFinance;
use stockpile::{
    Field, FileCache, Orchestrator, Provider, RateLimiter, StockpileConfig, StockpileError,
};

fn config() -> StockpileConfig {
    StockpileConfig {
        sec_user_agent: Some("test_agent example@example.com".to_string()),
        alpha_vantage_api_key: Some(
            std::env::var("ALPHA_VANTAGE_API_KEY").unwrap_or_else(|_| "demo".to_string()),
        ),
        ..StockpileConfig::default()
    }
}

#[tokio::test]
#[ignore]
async fn yahoo_resolves_known_symbol() {
    let yahoo = YahooFinance::from_config(&config()).unwrap();
    let handle = yahoo.resolve(&entity("AAPL")).await.unwrap();
    assert_eq!(handle.upstream_id, "AAPL");
}

#[tokio::test]
#[ignore]
async fn yahoo_unknown_symbol() {
    let yahoo = YahooFinance::from_config(&config()).unwrap();
    let result = yahoo.resolve(&entity("NOTAREALTICKERXYZ")).await;
    assert!(matches!(result, Err(StockpileError::EntityNotFound(_))));
}

#[tokio::test]
#[ignore]
async fn yahoo_history() {
    let yahoo = YahooFinance::from_config(&config()).unwrap();
    let handle = yahoo.resolve(&entity("AAPL")).await.unwrap();
    let history = yahoo.fetch_field(&handle, Field::History).await.unwrap();
    assert!(!history["close"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn yahoo_full_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let yahoo = YahooFinance::from_config(&config()).unwrap();
    let orchestrator = Orchestrator::new(
        std::sync::Arc::new(yahoo),
        FileCache::new(dir.path()),
        RateLimiter::unlimited(),
    );

    let document = orchestrator.fetch(&entity("MSFT"), false).await.unwrap();
    assert_eq!(document.len(), orchestrator.provider().fields().len());
    assert!(!document.is_total_failure());
}

#[tokio::test]
#[ignore]
async fn sec_resolves_cik() {
    let sec = SecEdgar::from_config(&config()).unwrap();
    assert_eq!(sec.company_cik("AAPL").await.unwrap(), 320193);

    let handle = sec.resolve(&entity("AAPL")).await.unwrap();
    assert_eq!(handle.upstream_id, "0000320193");
}

#[tokio::test]
#[ignore]
async fn sec_unknown_ticker() {
    let sec = SecEdgar::from_config(&config()).unwrap();
    let result = sec.resolve(&entity("INVALID")).await;
    assert!(matches!(result, Err(StockpileError::EntityNotFound(_))));
}

#[tokio::test]
#[ignore]
async fn sec_annual_reports() {
    let sec = SecEdgar::from_config(&config()).unwrap();
    let handle = sec.resolve(&entity("AAPL")).await.unwrap();
    let filings = sec.fetch_field(&handle, Field::Form10K).await.unwrap();

    let filings = filings.as_array().unwrap();
    assert!(!filings.is_empty() && filings.len() <= 4);
    assert!(filings[0]["url"].as_str().unwrap().contains("/data/320193/"));
}

#[tokio::test]
#[ignore]
async fn alpha_vantage_global_quote() {
    let alpha = AlphaVantage::from_config(&config()).unwrap();
    let handle = alpha.resolve(&entity("IBM")).await.unwrap();
    let quote = alpha.fetch_field(&handle, Field::GlobalQuote).await.unwrap();
    assert_eq!(quote["Global Quote"]["01. symbol"], "IBM");
}
