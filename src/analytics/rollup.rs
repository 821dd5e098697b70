//! Monthly rollups and their quarter/year composition
//!
//! Each month's aggregate is computed once from raw events and persisted under
//! its `YYYY-MM` key. Quarter and year views are never stored: they are summed
//! from the stored months on demand.
//!
//! A month with no stored record counts as zero. A month whose read *fails*
//! is handled according to the store's [`CompositionPolicy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::error::{StatsError, StatsResult};
use crate::analytics::labels;
use crate::analytics::models::{
    merge_by_region, ByRegion, Counts, MonthlyAggregate, QuarterAggregate, YearAggregate,
};
use crate::models::MonthKey;
use crate::storage::{RollupStorage, StoredDocument};

/// What quarter/year composition does when reading one of its months fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionPolicy {
    /// Any failed read fails the whole composition
    #[default]
    Strict,
    /// A failed read is logged and counted as a missing month
    Lenient,
}

/// A stored month as returned by [`RollupStore::list_available_months`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthEntry {
    pub month_key: MonthKey,
    pub aggregate: MonthlyAggregate,
}

/// Shape of a stored month document. Everything is optional so that
/// partially written records still decode.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMonth {
    year: Option<i32>,
    month: Option<u32>,
    #[serde(default)]
    monthly: Counts,
    #[serde(default)]
    by_city: ByRegion,
}

#[derive(Clone)]
pub struct RollupStore {
    storage: Arc<dyn RollupStorage>,
    policy: CompositionPolicy,
}

impl RollupStore {
    pub fn new(storage: Arc<dyn RollupStorage>) -> Self {
        Self {
            storage,
            policy: CompositionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CompositionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upsert the aggregate for `key`. The key wins over whatever year and
    /// month the aggregate carries; timestamps are stamped by the storage.
    pub async fn save_month(&self, key: MonthKey, aggregate: &MonthlyAggregate) -> StatsResult<()> {
        if aggregate.key() != Some(key) {
            warn!(
                "Aggregate for {}-{:02} saved under key {}, using the key",
                aggregate.year, aggregate.month, key
            );
        }

        let normalized = MonthlyAggregate {
            monthly: aggregate.monthly,
            by_city: aggregate.by_city.clone(),
            ..MonthlyAggregate::empty(key)
        };

        let fields = match serde_json::to_value(&normalized) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Err(StatsError::Encode {
                    key: key.to_string(),
                    source: serde::ser::Error::custom("aggregate did not serialize to an object"),
                })
            }
            Err(source) => {
                return Err(StatsError::Encode {
                    key: key.to_string(),
                    source,
                })
            }
        };

        self.storage.upsert(&key.to_string(), fields).await?;
        info!(
            "Saved statistics for {}: {} events ({} home)",
            key,
            normalized.monthly.total(),
            normalized.monthly.home_count()
        );
        Ok(())
    }

    /// The stored aggregate for `key`, `None` when nothing was saved
    pub async fn get_month(&self, key: MonthKey) -> StatsResult<Option<MonthlyAggregate>> {
        let stored = self.storage.get(&key.to_string()).await?;
        stored.map(|document| decode_month(key, document)).transpose()
    }

    /// Sum of the three months of `quarter` (1-4) in `year`
    pub async fn get_quarter(&self, quarter: u32, year: i32) -> StatsResult<QuarterAggregate> {
        let [first, second, third] = MonthKey::quarter_months(quarter, year)?;

        let (a, b, c) = tokio::try_join!(
            self.fetch_for_composition(first),
            self.fetch_for_composition(second),
            self.fetch_for_composition(third),
        )?;

        let mut aggregate = QuarterAggregate {
            year,
            quarter,
            label: labels::quarter_label(first),
            totals: Counts::default(),
            by_city: ByRegion::new(),
            months_with_data: Vec::new(),
        };

        // Month order matters: a region keeps the color of the first month
        // that introduced it
        for (key, month) in [(first, a), (second, b), (third, c)] {
            if let Some(month) = month {
                aggregate.totals.merge(&month.monthly);
                merge_by_region(&mut aggregate.by_city, &month.by_city);
                aggregate.months_with_data.push(key);
            }
        }

        debug!(
            "Composed {}: {} events from {} stored months",
            aggregate.label,
            aggregate.totals.total(),
            aggregate.months_with_data.len()
        );
        Ok(aggregate)
    }

    /// Sum of the four quarters of `year`, with the quarters embedded
    pub async fn get_year(&self, year: i32) -> StatsResult<YearAggregate> {
        let (q1, q2, q3, q4) = tokio::try_join!(
            self.get_quarter(1, year),
            self.get_quarter(2, year),
            self.get_quarter(3, year),
            self.get_quarter(4, year),
        )?;

        let mut aggregate = YearAggregate {
            year,
            totals: Counts::default(),
            by_city: ByRegion::new(),
            quarters: Vec::with_capacity(4),
            months_with_data: Vec::new(),
        };

        for quarter in [q1, q2, q3, q4] {
            aggregate.totals.merge(&quarter.totals);
            merge_by_region(&mut aggregate.by_city, &quarter.by_city);
            aggregate
                .months_with_data
                .extend(quarter.months_with_data.iter().copied());
            aggregate.quarters.push(quarter);
        }

        debug!(
            "Composed year {}: {} events from {} stored months",
            year,
            aggregate.totals.total(),
            aggregate.months_with_data.len()
        );
        Ok(aggregate)
    }

    /// Years with at least one stored month, most recent first
    pub async fn list_available_years(&self) -> StatsResult<Vec<i32>> {
        let years: BTreeSet<i32> = self
            .stored_keys("")
            .await?
            .into_iter()
            .map(|key| key.year())
            .collect();

        Ok(years.into_iter().rev().collect())
    }

    /// Stored months of `year`, most recent first
    pub async fn list_available_months(&self, year: i32) -> StatsResult<Vec<MonthEntry>> {
        let mut keys = self.stored_keys(&MonthKey::year_prefix(year)).await?;
        keys.sort_unstable_by(|a, b| b.cmp(a));

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            // Deleted between listing and reading
            let Some(aggregate) = self.get_month(key).await? else {
                continue;
            };
            entries.push(MonthEntry {
                month_key: key,
                aggregate,
            });
        }

        Ok(entries)
    }

    /// Administrative removal of a stored month
    pub async fn delete_month(&self, key: MonthKey) -> StatsResult<bool> {
        let deleted = self.storage.delete(&key.to_string()).await?;
        if deleted {
            info!("Deleted statistics for {}", key);
        }
        Ok(deleted)
    }

    async fn stored_keys(&self, prefix: &str) -> StatsResult<Vec<MonthKey>> {
        let keys = self.storage.list_keys(prefix).await?;

        Ok(keys
            .into_iter()
            .filter_map(|raw| match raw.parse::<MonthKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!("Ignoring stored key '{}': {}", raw, e);
                    None
                }
            })
            .collect())
    }

    async fn fetch_for_composition(&self, key: MonthKey) -> StatsResult<Option<MonthlyAggregate>> {
        match (self.get_month(key).await, self.policy) {
            (Ok(month), _) => Ok(month),
            (Err(e), CompositionPolicy::Strict) => Err(e),
            (Err(e), CompositionPolicy::Lenient) => {
                warn!("Treating {} as missing after failed read: {}", key, e);
                Ok(None)
            }
        }
    }
}

fn decode_month(key: MonthKey, document: StoredDocument) -> StatsResult<MonthlyAggregate> {
    let stored: StoredMonth =
        serde_json::from_value(document.doc).map_err(|source| StatsError::CorruptRecord {
            key: key.to_string(),
            source,
        })?;

    if stored.year.is_some_and(|year| year != key.year())
        || stored.month.is_some_and(|month| month != key.month())
    {
        warn!(
            "Stored record {} claims {:?}-{:?}, using the key",
            key, stored.year, stored.month
        );
    }

    Ok(MonthlyAggregate {
        monthly: stored.monthly,
        by_city: stored.by_city,
        created_at: DateTime::<Utc>::from_timestamp_millis(document.created_at),
        updated_at: DateTime::<Utc>::from_timestamp_millis(document.updated_at),
        ..MonthlyAggregate::empty(key)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::RegionEntry;
    use crate::storage::MemoryStorage;

    fn key(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    fn month_with(key: MonthKey, home: u64, other: u64) -> MonthlyAggregate {
        MonthlyAggregate {
            monthly: Counts::new(home, other),
            ..MonthlyAggregate::empty(key)
        }
    }

    fn store() -> RollupStore {
        RollupStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_get_month_missing_is_none() {
        assert!(store().get_month(key(2025, 6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_get_month() {
        let store = store();
        let mut aggregate = month_with(key(2025, 6), 4, 1);
        aggregate.by_city.insert(
            "Москва".to_string(),
            RegionEntry { count: 1, color: "#FDD835".to_string() },
        );

        store.save_month(key(2025, 6), &aggregate).await.unwrap();
        let loaded = store.get_month(key(2025, 6)).await.unwrap().unwrap();

        assert_eq!(loaded.monthly, Counts::new(4, 1));
        assert_eq!(loaded.month_name, "Июнь");
        assert_eq!(loaded.quarter, 2);
        assert_eq!(loaded.by_city, aggregate.by_city);
        assert!(loaded.created_at.is_some());
        assert!(loaded.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_save_uses_key_over_aggregate_fields() {
        let store = store();
        let aggregate = month_with(key(2024, 1), 1, 0);

        store.save_month(key(2025, 3), &aggregate).await.unwrap();
        let loaded = store.get_month(key(2025, 3)).await.unwrap().unwrap();

        assert_eq!((loaded.year, loaded.month), (2025, 3));
        assert!(store.get_month(key(2024, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quarter_sums_months() {
        let store = store();
        store.save_month(key(2025, 4), &month_with(key(2025, 4), 5, 2)).await.unwrap();
        store.save_month(key(2025, 5), &month_with(key(2025, 5), 3, 1)).await.unwrap();
        store.save_month(key(2025, 6), &month_with(key(2025, 6), 0, 0)).await.unwrap();

        let quarter = store.get_quarter(2, 2025).await.unwrap();
        assert_eq!(quarter.totals, Counts::new(8, 3));
        assert_eq!(quarter.totals.total(), 11);
        assert_eq!(quarter.label, "Q2 2025");
        assert_eq!(quarter.months_with_data.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_quarter_is_an_error() {
        let err = store().get_quarter(0, 2025).await.unwrap_err();
        assert!(matches!(err, StatsError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_years_and_months_listed_newest_first() {
        let store = store();
        for (year, month) in [(2023, 5), (2025, 1), (2024, 11), (2025, 3)] {
            store
                .save_month(key(year, month), &month_with(key(year, month), 1, 0))
                .await
                .unwrap();
        }

        assert_eq!(store.list_available_years().await.unwrap(), vec![2025, 2024, 2023]);

        let months: Vec<MonthKey> = store
            .list_available_months(2025)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.month_key)
            .collect();
        assert_eq!(months, vec![key(2025, 3), key(2025, 1)]);
        assert!(store.list_available_months(2022).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_month() {
        let store = store();
        store.save_month(key(2025, 2), &month_with(key(2025, 2), 1, 1)).await.unwrap();

        assert!(store.delete_month(key(2025, 2)).await.unwrap());
        assert!(store.get_month(key(2025, 2)).await.unwrap().is_none());
        assert!(!store.delete_month(key(2025, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        let mut fields = serde_json::Map::new();
        fields.insert("monthly".to_string(), Value::String("oops".to_string()));
        storage.upsert("2025-06", fields).await.unwrap();

        let store = RollupStore::new(storage);
        let err = store.get_month(key(2025, 6)).await.unwrap_err();
        assert!(matches!(err, StatsError::CorruptRecord { ref key, .. } if key == "2025-06"));

        // Strict composition surfaces it, lenient composition skips the month
        assert!(store.get_quarter(2, 2025).await.is_err());
        let lenient = store.with_policy(CompositionPolicy::Lenient);
        let quarter = lenient.get_quarter(2, 2025).await.unwrap();
        assert_eq!(quarter.totals, Counts::default());
        assert!(quarter.months_with_data.is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_counts_are_a_corrupt_record() {
        let storage = Arc::new(MemoryStorage::new());
        let mut fields = serde_json::Map::new();
        fields.insert(
            "monthly".to_string(),
            serde_json::json!({"homeCount": u64::MAX, "otherCount": 1}),
        );
        storage.upsert("2025-06", fields).await.unwrap();

        let store = RollupStore::new(storage);
        let err = store.get_month(key(2025, 6)).await.unwrap_err();
        assert!(matches!(err, StatsError::CorruptRecord { ref key, .. } if key == "2025-06"));
        assert!(store.get_year(2025).await.is_err());
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(serde_json::to_string(&CompositionPolicy::Lenient).unwrap(), "\"lenient\"");
        assert_eq!(CompositionPolicy::default(), CompositionPolicy::Strict);
    }
}
