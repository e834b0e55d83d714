mod common;

use common::{PRICES, day, entity};
use serde_json::{Value, json};
use stockpile::{Field, FieldError, FieldErrorKind, FileCache, ResultDocument, StockpileError};

fn sample_document() -> ResultDocument {
    let mut document = ResultDocument::new();
    document.insert(Field::Info, Ok(json!({"longName": "Apple Inc.", "beta": 1.24})));
    document.insert(Field::History, Ok(json!({"close": [185.64, 184.25]})));
    document.insert(
        Field::News,
        Err(FieldError::new(FieldErrorKind::Request, "operation timed out")),
    );
    document
}

#[tokio::test]
async fn store_then_lookup_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let aapl = entity("AAPL");
    let document = sample_document();

    let path = cache.store(&aapl, day(2024, 1, 1), &document).await.unwrap();
    assert_eq!(path, dir.path().join("AAPL").join("2024-01-01-AAPL.json"));

    let loaded = cache.lookup(&aapl, day(2024, 1, 1)).await.unwrap();
    assert_eq!(loaded, document);
    assert_eq!(
        loaded.error(Field::News).map(|e| e.kind),
        Some(FieldErrorKind::Request)
    );
}

#[tokio::test]
async fn floats_read_back_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let aapl = entity("AAPL");

    let mut document = ResultDocument::new();
    document.insert(Field::History, Ok(json!({ "close": PRICES })));
    cache.store(&aapl, day(2024, 1, 1), &document).await.unwrap();

    let loaded = cache.lookup(&aapl, day(2024, 1, 1)).await.unwrap();
    assert_eq!(loaded, document);
    let closes = loaded.value(Field::History).unwrap()["close"].as_array().unwrap();
    for (loaded, stored) in closes.iter().zip(PRICES) {
        assert_eq!(loaded.as_f64().unwrap().to_bits(), stored.to_bits());
    }
}

#[tokio::test]
async fn persisted_document_is_flat_json_with_markers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let path = cache
        .store(&entity("AAPL"), day(2024, 1, 1), &sample_document())
        .await
        .unwrap();

    let raw: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(raw["info"]["longName"], "Apple Inc.");
    assert_eq!(raw["news"], "ERROR[request]: operation timed out");
}

#[tokio::test]
async fn miss_then_hit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let msft = entity("msft");

    assert!(cache.lookup(&msft, day(2024, 3, 15)).await.is_none());
    cache
        .store(&msft, day(2024, 3, 15), &sample_document())
        .await
        .unwrap();
    assert!(cache.lookup(&msft, day(2024, 3, 15)).await.is_some());

    // other days are still misses
    assert!(cache.lookup(&msft, day(2024, 3, 16)).await.is_none());
}

#[tokio::test]
async fn corrupt_snapshot_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let aapl = entity("AAPL");

    std::fs::create_dir_all(cache.entity_dir(&aapl)).unwrap();
    let path = cache.entity_dir(&aapl).join("2024-01-01-AAPL.json");
    std::fs::write(&path, b"{\"info\": {\"longName\": \"Apple").unwrap();

    assert!(cache.lookup(&aapl, day(2024, 1, 1)).await.is_none());

    // a fresh store replaces the corrupt file
    cache
        .store(&aapl, day(2024, 1, 1), &sample_document())
        .await
        .unwrap();
    assert!(cache.lookup(&aapl, day(2024, 1, 1)).await.is_some());
}

#[tokio::test]
async fn latest_follows_most_recent_store() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let aapl = entity("AAPL");
    assert!(cache.latest(&aapl).await.is_none());

    let mut first = ResultDocument::new();
    first.insert(Field::Info, Ok(json!({"day": 1})));
    let mut second = ResultDocument::new();
    second.insert(Field::Info, Ok(json!({"day": 2})));

    cache.store(&aapl, day(2024, 1, 1), &first).await.unwrap();
    cache.store(&aapl, day(2024, 1, 2), &second).await.unwrap();

    assert_eq!(cache.latest(&aapl).await, Some(second));
    assert_eq!(cache.lookup(&aapl, day(2024, 1, 1)).await, Some(first));
    assert!(cache.latest_path(&aapl).ends_with("AAPL/latest-AAPL.json"));
}

#[tokio::test]
async fn no_temporary_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path());
    let aapl = entity("AAPL");
    cache
        .store(&aapl, day(2024, 1, 1), &sample_document())
        .await
        .unwrap();

    let mut names: Vec<String> = std::fs::read_dir(cache.entity_dir(&aapl))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["2024-01-01-AAPL.json", "latest-AAPL.json"]);
}

#[tokio::test]
async fn unwritable_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"").unwrap();

    let cache = FileCache::new(blocker.join("market"));
    let result = cache
        .store(&entity("AAPL"), day(2024, 1, 1), &sample_document())
        .await;
    assert!(matches!(result, Err(StockpileError::CacheWrite { .. })));
    assert!(matches!(
        cache.ensure_writable().await,
        Err(StockpileError::CacheWrite { .. })
    ));
}

#[tokio::test]
async fn ensure_writable_creates_root() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(dir.path().join("data").join("sec"));
    cache.ensure_writable().await.unwrap();
    assert!(cache.root().is_dir());
    assert_eq!(std::fs::read_dir(cache.root()).unwrap().count(), 0);
}
