//! Integration tests for monthly rollups and their composition
//!
//! Every test runs against the in-memory backend and a file-backed SQLite
//! database, so both backends are held to the same composition rules.

use async_trait::async_trait;
use choir_stats::analytics::regions::HOME_REGION;
use choir_stats::analytics::{
    compute_windows, summarize_month, CompositionPolicy, Counts, MonthlyAggregate, RegionEntry,
    RegionPalette, RollupStore, StatsError, StatsService,
};
use choir_stats::config::StatsConfig;
use choir_stats::models::{Event, MonthKey};
use choir_stats::storage::{
    MemoryStorage, RollupStorage, SqliteStorage, StorageError, StorageResult, StoredDocument,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn key(year: i32, month: u32) -> MonthKey {
    MonthKey::new(year, month).unwrap()
}

fn month_with(key: MonthKey, home: u64, other: u64) -> MonthlyAggregate {
    MonthlyAggregate {
        monthly: Counts::new(home, other),
        ..MonthlyAggregate::empty(key)
    }
}

/// Helper to create a file-backed SQLite storage; the directory must outlive it
async fn create_sqlite_storage() -> (TempDir, Arc<dyn RollupStorage>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("stats.db").display());
    let storage = SqliteStorage::new(&url, 5).await.unwrap();
    storage.init().await.unwrap();
    (dir, Arc::new(storage))
}

fn create_memory_storage() -> Arc<dyn RollupStorage> {
    Arc::new(MemoryStorage::new())
}

/// Storage whose reads fail for a single key
struct FailingStorage {
    inner: MemoryStorage,
    broken_key: String,
}

#[async_trait]
impl RollupStorage for FailingStorage {
    async fn init(&self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        if key == self.broken_key {
            return Err(StorageError::Other(anyhow::anyhow!("disk on fire")));
        }
        self.inner.get(key).await
    }

    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()> {
        self.inner.upsert(key, fields).await
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(prefix).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key).await
    }
}

async fn check_quarter_round_trip(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    store.save_month(key(2025, 4), &month_with(key(2025, 4), 5, 2)).await.unwrap();
    store.save_month(key(2025, 5), &month_with(key(2025, 5), 3, 1)).await.unwrap();
    store.save_month(key(2025, 6), &month_with(key(2025, 6), 0, 0)).await.unwrap();

    let april = store.get_month(key(2025, 4)).await.unwrap().unwrap();
    assert_eq!(april.monthly, Counts::new(5, 2));
    assert_eq!(april.monthly.total(), 7);

    let quarter = store.get_quarter(2, 2025).await.unwrap();
    assert_eq!(quarter.totals.home_count(), 8);
    assert_eq!(quarter.totals.other_count(), 3);
    assert_eq!(quarter.totals.total(), 11);
}

#[tokio::test]
async fn test_quarter_round_trip_memory() {
    check_quarter_round_trip(create_memory_storage()).await;
}

#[tokio::test]
async fn test_quarter_round_trip_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_quarter_round_trip(storage).await;
}

async fn check_year_is_sum_of_quarters(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    let saved = [(1, 2, 1), (2, 0, 4), (5, 7, 0), (8, 1, 1), (11, 3, 3), (12, 0, 1)];
    for (month, home, other) in saved {
        store
            .save_month(key(2024, month), &month_with(key(2024, month), home, other))
            .await
            .unwrap();
    }
    // Neighbouring years must not leak in
    store.save_month(key(2023, 12), &month_with(key(2023, 12), 9, 9)).await.unwrap();
    store.save_month(key(2025, 1), &month_with(key(2025, 1), 9, 9)).await.unwrap();

    let year = store.get_year(2024).await.unwrap();

    let mut summed = Counts::default();
    for quarter in 1..=4 {
        let q = store.get_quarter(quarter, 2024).await.unwrap();
        assert_eq!(year.quarters[(quarter - 1) as usize], q);
        summed.merge(&q.totals);
    }
    assert_eq!(year.totals, summed);
    assert_eq!(year.totals, Counts::new(13, 10));
    assert_eq!(year.months_with_data.len(), saved.len());
}

#[tokio::test]
async fn test_year_is_sum_of_quarters_memory() {
    check_year_is_sum_of_quarters(create_memory_storage()).await;
}

#[tokio::test]
async fn test_year_is_sum_of_quarters_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_year_is_sum_of_quarters(storage).await;
}

/// Two seasons of events, including undated and malformed records
fn two_seasons() -> Vec<Event> {
    let mut events = vec![
        Event { date: None, region: Some(HOME_REGION.to_string()) },
        Event::new("12.05.2025", Some(HOME_REGION)),
        Event::new("0000-02-01", Some(HOME_REGION)),
    ];
    let regions = [Some(HOME_REGION), Some("Москва"), None, Some("Где-то далеко"), Some("Курская область")];
    for (i, (year, month)) in [
        (2024, 1), (2024, 2), (2024, 2), (2024, 5), (2024, 7), (2024, 9), (2024, 9), (2024, 10),
        (2024, 12), (2025, 1), (2025, 3), (2025, 3), (2025, 4), (2025, 6), (2025, 8), (2025, 11),
        (2025, 11), (2025, 12),
    ]
    .into_iter()
    .enumerate()
    {
        let day = i % 28 + 1;
        events.push(Event::new(format!("{year}-{month:02}-{day:02}"), regions[i % regions.len()]));
    }
    events
}

async fn check_stored_rollups_match_live_windows(storage: Arc<dyn RollupStorage>) {
    let service = StatsService::from_config(&StatsConfig::default(), storage);
    let events = two_seasons();
    let palette = service.palette();

    service.snapshot_all(&events, false).await.unwrap();
    let store = service.store();

    for year in [2024, 2025] {
        let mut quarters = Counts::default();
        for quarter in 1..=4 {
            let composed = store.get_quarter(quarter, year).await.unwrap();
            for month in 1..=3 {
                let reference = key(year, (quarter - 1) * 3 + month);
                let live = compute_windows(&events, palette, reference);
                assert_eq!(composed.totals, live.quarterly, "Q{quarter} {year} at {reference}");
            }
            let by_city: u64 = composed.by_city.values().map(|entry| entry.count).sum();
            assert_eq!(by_city, composed.totals.total());
            quarters.merge(&composed.totals);
        }

        // Nine dated events per year; undated and malformed ones count nowhere
        assert_eq!(quarters.total(), 9);
        let composed_year = store.get_year(year).await.unwrap();
        assert_eq!(composed_year.totals, quarters);
    }

    assert_eq!(store.list_available_years().await.unwrap(), vec![2025, 2024]);
}

#[tokio::test]
async fn test_stored_rollups_match_live_windows_memory() {
    check_stored_rollups_match_live_windows(create_memory_storage()).await;
}

#[tokio::test]
async fn test_stored_rollups_match_live_windows_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_stored_rollups_match_live_windows(storage).await;
}

async fn check_missing_months_count_as_zero(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    store.save_month(key(2025, 8), &month_with(key(2025, 8), 2, 2)).await.unwrap();

    let quarter = store.get_quarter(3, 2025).await.unwrap();
    assert_eq!(quarter.totals, Counts::new(2, 2));
    assert_eq!(quarter.months_with_data, vec![key(2025, 8)]);

    let empty = store.get_quarter(1, 1999).await.unwrap();
    assert_eq!(empty.totals, Counts::default());
    assert!(empty.months_with_data.is_empty());
    assert!(empty.by_city.is_empty());
}

#[tokio::test]
async fn test_missing_months_count_as_zero_memory() {
    check_missing_months_count_as_zero(create_memory_storage()).await;
}

#[tokio::test]
async fn test_missing_months_count_as_zero_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_missing_months_count_as_zero(storage).await;
}

async fn check_idempotent_save(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    let aggregate = month_with(key(2025, 2), 4, 4);

    store.save_month(key(2025, 2), &aggregate).await.unwrap();
    let first = store.get_month(key(2025, 2)).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    store.save_month(key(2025, 2), &aggregate).await.unwrap();
    let second = store.get_month(key(2025, 2)).await.unwrap().unwrap();

    assert_eq!(first.monthly, second.monthly);
    assert_eq!(first.by_city, second.by_city);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(store.list_available_months(2025).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_idempotent_save_memory() {
    check_idempotent_save(create_memory_storage()).await;
}

#[tokio::test]
async fn test_idempotent_save_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_idempotent_save(storage).await;
}

async fn check_resave_replaces_regions(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    let palette = RegionPalette::standard();
    let early = vec![
        Event::new("2025-03-01", Some("Москва")),
        Event::new("2025-03-02", Some(HOME_REGION)),
    ];
    store
        .save_month(key(2025, 3), &summarize_month(&early, palette, key(2025, 3)))
        .await
        .unwrap();

    // The Moscow event turned out to be a typo and was moved
    let corrected = vec![
        Event::new("2025-03-01", Some("Курская область")),
        Event::new("2025-03-02", Some(HOME_REGION)),
    ];
    store
        .save_month(key(2025, 3), &summarize_month(&corrected, palette, key(2025, 3)))
        .await
        .unwrap();

    let loaded = store.get_month(key(2025, 3)).await.unwrap().unwrap();
    assert!(!loaded.by_city.contains_key("Москва"));
    assert_eq!(
        loaded.by_city.get("Курская область"),
        Some(&RegionEntry {
            count: 1,
            color: palette.color_for_region(Some("Курская область")).to_string(),
        })
    );
}

#[tokio::test]
async fn test_resave_replaces_regions_memory() {
    check_resave_replaces_regions(create_memory_storage()).await;
}

#[tokio::test]
async fn test_resave_replaces_regions_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_resave_replaces_regions(storage).await;
}

async fn check_listing_order(storage: Arc<dyn RollupStorage>) {
    let store = RollupStore::new(storage);
    for (year, month) in [(2024, 12), (2022, 7), (2025, 2), (2024, 3), (2025, 10)] {
        store
            .save_month(key(year, month), &month_with(key(year, month), 1, 0))
            .await
            .unwrap();
    }

    assert_eq!(store.list_available_years().await.unwrap(), vec![2025, 2024, 2022]);

    let months: Vec<String> = store
        .list_available_months(2024)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.month_key.to_string())
        .collect();
    assert_eq!(months, vec!["2024-12", "2024-03"]);
}

#[tokio::test]
async fn test_listing_order_memory() {
    check_listing_order(create_memory_storage()).await;
}

#[tokio::test]
async fn test_listing_order_sqlite() {
    let (_dir, storage) = create_sqlite_storage().await;
    check_listing_order(storage).await;
}

#[tokio::test]
async fn test_region_colors_survive_composition() {
    let store = RollupStore::new(create_memory_storage());
    let palette = RegionPalette::standard();

    let january = vec![
        Event::new("2025-01-05", Some("Москва")),
        Event::new("2025-01-06", None),
    ];
    let february = vec![
        Event::new("2025-02-05", Some("Москва")),
        Event::new("2025-02-06", Some("Тамбовская область")),
    ];
    store
        .save_month(key(2025, 1), &summarize_month(&january, palette, key(2025, 1)))
        .await
        .unwrap();
    store
        .save_month(key(2025, 2), &summarize_month(&february, palette, key(2025, 2)))
        .await
        .unwrap();

    let quarter = store.get_quarter(1, 2025).await.unwrap();
    let moscow = quarter.by_city.get("Москва").unwrap();
    assert_eq!(moscow.count, 2);
    assert_eq!(moscow.color, palette.color_for_region(Some("Москва")));
    let counted: u64 = quarter.by_city.values().map(|entry| entry.count).sum();
    assert_eq!(counted, quarter.totals.total());
}

fn failing_store(policy: CompositionPolicy) -> (Arc<FailingStorage>, RollupStore) {
    let storage = Arc::new(FailingStorage {
        inner: MemoryStorage::new(),
        broken_key: "2025-05".to_string(),
    });
    let store = RollupStore::new(storage.clone()).with_policy(policy);
    (storage, store)
}

#[tokio::test]
async fn test_strict_composition_fails_on_read_error() {
    let (_storage, store) = failing_store(CompositionPolicy::Strict);
    store.save_month(key(2025, 4), &month_with(key(2025, 4), 5, 2)).await.unwrap();
    store.save_month(key(2025, 5), &month_with(key(2025, 5), 3, 1)).await.unwrap();

    let err = store.get_quarter(2, 2025).await.unwrap_err();
    assert!(matches!(err, StatsError::Storage(_)));
    assert!(store.get_year(2025).await.is_err());

    // Quarters not touching the broken month still compose
    assert!(store.get_quarter(1, 2025).await.is_ok());
}

#[tokio::test]
async fn test_lenient_composition_skips_unreadable_month() {
    let (_storage, store) = failing_store(CompositionPolicy::Lenient);
    store.save_month(key(2025, 4), &month_with(key(2025, 4), 5, 2)).await.unwrap();
    store.save_month(key(2025, 5), &month_with(key(2025, 5), 3, 1)).await.unwrap();

    let quarter = store.get_quarter(2, 2025).await.unwrap();
    assert_eq!(quarter.totals, Counts::new(5, 2));
    assert_eq!(quarter.months_with_data, vec![key(2025, 4)]);

    let year = store.get_year(2025).await.unwrap();
    assert_eq!(year.totals, Counts::new(5, 2));

    // Direct reads are never softened
    assert!(store.get_month(key(2025, 5)).await.is_err());
}

#[tokio::test]
async fn test_concurrent_saves_of_distinct_months() {
    let (_dir, storage) = create_sqlite_storage().await;
    let store = RollupStore::new(storage);

    let mut handles = vec![];
    for month in 1..=12 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .save_month(key(2024, month), &month_with(key(2024, month), 1, 1))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let year = store.get_year(2024).await.unwrap();
    assert_eq!(year.totals, Counts::new(12, 12));
    assert_eq!(store.list_available_months(2024).await.unwrap().len(), 12);
}
