mod common;

use common::{FAKE_FIELDS, FakeProvider, PRICES, day, entity};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stockpile::{
    Field, FieldErrorKind, FileCache, Orchestrator, ProviderKey, RateLimiter, Source,
};
use tokio::time::Instant;

fn orchestrator(provider: Arc<FakeProvider>, root: &std::path::Path) -> Orchestrator {
    Orchestrator::new(provider, FileCache::new(root), RateLimiter::unlimited())
}

#[tokio::test]
async fn first_fetch_writes_snapshot_second_is_served_from_cache() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());
    let aapl = entity("AAPL");

    let first = orchestrator
        .fetch_detailed(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();
    let expected_path = data_dir.path().join("AAPL").join("2024-01-01-AAPL.json");
    assert_eq!(first.source, Source::Provider(expected_path.clone()));
    assert!(expected_path.is_file());
    assert_eq!(first.document.len(), FAKE_FIELDS.len());
    assert_eq!(provider.resolves(), 1);
    assert_eq!(provider.field_calls(), FAKE_FIELDS.len());

    let calls = provider.calls();
    let second = orchestrator
        .fetch_detailed(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();
    assert!(second.is_cache_hit());
    assert_eq!(second.document, first.document);
    assert_eq!(provider.calls(), calls);
}

#[tokio::test]
async fn repeated_fetch_returns_identical_prices() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());
    let aapl = entity("AAPL");

    let fresh = orchestrator.fetch(&aapl, false).await.unwrap();
    let cached = orchestrator.fetch(&aapl, false).await.unwrap();

    assert_eq!(provider.resolves(), 1);
    assert_eq!(cached, fresh);
    assert_eq!(
        cached.value(Field::History).unwrap()["close"],
        serde_json::json!(PRICES)
    );
}

#[tokio::test]
async fn lowercase_ids_share_the_uppercase_snapshot() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());

    orchestrator
        .fetch_as_of(&entity("aapl"), day(2024, 1, 1), false)
        .await
        .unwrap();
    orchestrator
        .fetch_as_of(&entity(" AAPL "), day(2024, 1, 1), false)
        .await
        .unwrap();

    assert_eq!(provider.resolves(), 1);
    assert!(data_dir.path().join("AAPL/2024-01-01-AAPL.json").is_file());
}

#[tokio::test]
async fn failed_field_keeps_its_slot() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo).failing(Field::History));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());
    let aapl = entity("AAPL");

    let document = orchestrator
        .fetch_as_of(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();

    assert_eq!(document.len(), 3);
    assert_eq!(document.failures(), 1);
    assert_eq!(
        document.error(Field::History).map(|e| e.kind),
        Some(FieldErrorKind::InvalidResponse)
    );
    assert_eq!(document.value(Field::Info).unwrap()["symbol"], "AAPL");
    assert_eq!(document.value(Field::News).unwrap()["field"], "news");
    // the field after the failing one was still attempted
    assert_eq!(provider.field_calls(), 3);

    let raw = std::fs::read_to_string(data_dir.path().join("AAPL/2024-01-01-AAPL.json")).unwrap();
    assert!(raw.contains("\"history\":\"ERROR[invalid_response]: "));

    // a partial snapshot is still a hit
    let again = orchestrator
        .fetch_as_of(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();
    assert_eq!(again, document);
    assert_eq!(provider.field_calls(), 3);
}

#[tokio::test]
async fn unresolvable_entity_is_persisted_with_markers() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Sec).unknown("ZZZZ"));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());

    let document = orchestrator
        .fetch_as_of(&entity("ZZZZ"), day(2024, 1, 1), false)
        .await
        .unwrap();

    assert!(document.is_total_failure());
    assert_eq!(document.len(), FAKE_FIELDS.len());
    for field in FAKE_FIELDS {
        assert_eq!(
            document.error(*field).map(|e| e.kind),
            Some(FieldErrorKind::Unresolved)
        );
    }
    assert_eq!(provider.field_calls(), 0);
    assert!(data_dir.path().join("ZZZZ/2024-01-01-ZZZZ.json").is_file());
}

#[tokio::test]
async fn force_bypasses_the_cache() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());
    let aapl = entity("AAPL");

    orchestrator
        .fetch_as_of(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();
    let forced = orchestrator
        .fetch_detailed(&aapl, day(2024, 1, 1), true)
        .await
        .unwrap();

    assert!(!forced.is_cache_hit());
    assert_eq!(provider.resolves(), 2);
}

#[tokio::test]
async fn new_day_means_new_fetch() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());
    let aapl = entity("AAPL");

    orchestrator
        .fetch_as_of(&aapl, day(2024, 1, 1), false)
        .await
        .unwrap();
    orchestrator
        .fetch_as_of(&aapl, day(2024, 1, 2), false)
        .await
        .unwrap();

    assert_eq!(provider.resolves(), 2);
    assert!(data_dir.path().join("AAPL/2024-01-01-AAPL.json").is_file());
    assert!(data_dir.path().join("AAPL/2024-01-02-AAPL.json").is_file());
}

#[tokio::test]
async fn corrupt_snapshot_is_refetched() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = orchestrator(provider.clone(), data_dir.path());

    std::fs::create_dir_all(data_dir.path().join("AAPL")).unwrap();
    std::fs::write(data_dir.path().join("AAPL/2024-01-01-AAPL.json"), b"not json").unwrap();

    let fetched = orchestrator
        .fetch_detailed(&entity("AAPL"), day(2024, 1, 1), false)
        .await
        .unwrap();
    assert!(!fetched.is_cache_hit());
    assert_eq!(provider.resolves(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_of_one_entity_hit_upstream_once() {
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::new(ProviderKey::Yahoo).with_delay(Duration::from_millis(20)),
    );
    let orchestrator = Arc::new(orchestrator(provider.clone(), data_dir.path()));

    let fetches = (0..4).map(|_| {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .fetch_detailed(&entity("AAPL"), day(2024, 1, 1), false)
                .await
                .unwrap()
        })
    });
    let results: Vec<_> = join_all(fetches)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(provider.resolves(), 1);
    assert_eq!(results.iter().filter(|f| f.is_cache_hit()).count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn entity_fetches_are_spaced_per_provider() {
    let interval = Duration::from_millis(100);
    let limiter = Arc::new(RateLimiter::new(&HashMap::from([(
        ProviderKey::Yahoo,
        interval,
    )])));
    let data_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new(ProviderKey::Yahoo));
    let orchestrator = Arc::new(Orchestrator::new(
        provider.clone(),
        FileCache::new(data_dir.path()),
        limiter,
    ));

    let start = Instant::now();
    let fetches = ["AAPL", "MSFT", "NVDA"].map(|symbol| {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .fetch_as_of(&entity(symbol), day(2024, 1, 1), false)
                .await
                .unwrap()
        })
    });
    for result in join_all(fetches).await {
        result.unwrap();
    }

    let resolved_at = provider.resolved_at();
    assert_eq!(resolved_at.len(), 3);
    let last = resolved_at.iter().max().unwrap();
    assert!(last.duration_since(start) >= interval * 2);
}
