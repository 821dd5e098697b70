//! Data models for statistics aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::analytics::labels;
use crate::models::MonthKey;

/// Home vs. other split of a set of events
///
/// `total` always equals `home_count + other_count`; the fields are private
/// to keep it that way, and a stored `total` is recomputed on decode.
/// In-memory arithmetic saturates at `u64::MAX`; a stored pair whose sum
/// overflows is rejected when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredCounts")]
pub struct Counts {
    home_count: u64,
    other_count: u64,
    total: u64,
}

impl Counts {
    pub fn new(home_count: u64, other_count: u64) -> Self {
        Self {
            home_count,
            other_count,
            total: home_count.saturating_add(other_count),
        }
    }

    pub fn home_count(&self) -> u64 {
        self.home_count
    }

    pub fn other_count(&self) -> u64 {
        self.other_count
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count one event
    pub fn record(&mut self, is_home: bool) {
        if is_home {
            self.home_count = self.home_count.saturating_add(1);
        } else {
            self.other_count = self.other_count.saturating_add(1);
        }
        self.total = self.home_count.saturating_add(self.other_count);
    }

    pub fn merge(&mut self, other: &Counts) {
        *self = Counts::new(
            self.home_count.saturating_add(other.home_count),
            self.other_count.saturating_add(other.other_count),
        );
    }
}

#[derive(Debug, Error)]
#[error("home count {home_count} plus other count {other_count} overflows")]
pub struct CountsOverflow {
    home_count: u64,
    other_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCounts {
    #[serde(default)]
    home_count: u64,
    #[serde(default)]
    other_count: u64,
}

impl TryFrom<StoredCounts> for Counts {
    type Error = CountsOverflow;

    fn try_from(stored: StoredCounts) -> Result<Self, Self::Error> {
        let StoredCounts {
            home_count,
            other_count,
        } = stored;

        let total = home_count
            .checked_add(other_count)
            .ok_or(CountsOverflow {
                home_count,
                other_count,
            })?;

        Ok(Self {
            home_count,
            other_count,
            total,
        })
    }
}

/// Per-region tally with its display color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub count: u64,
    pub color: String,
}

/// Region label -> tally, ordered by label
pub type ByRegion = BTreeMap<String, RegionEntry>;

/// Fold `source` into `target`, summing counts. A region already present in
/// `target` keeps its color.
pub fn merge_by_region(target: &mut ByRegion, source: &ByRegion) {
    for (region, entry) in source {
        target
            .entry(region.clone())
            .and_modify(|existing| existing.count = existing.count.saturating_add(entry.count))
            .or_insert_with(|| entry.clone());
    }
}

/// Precomputed statistics for one month, persisted under its month key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAggregate {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub quarter: u32,
    pub monthly: Counts,
    #[serde(default)]
    pub by_city: ByRegion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MonthlyAggregate {
    /// An aggregate with no events for `key`
    pub fn empty(key: MonthKey) -> Self {
        Self {
            year: key.year(),
            month: key.month(),
            month_name: labels::month_name(key.month()).to_string(),
            quarter: key.quarter(),
            monthly: Counts::default(),
            by_city: ByRegion::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn key(&self) -> Option<MonthKey> {
        MonthKey::new(self.year, self.month).ok()
    }
}

/// Three months summed, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterAggregate {
    pub year: i32,
    pub quarter: u32,
    pub label: String,
    pub totals: Counts,
    pub by_city: ByRegion,
    /// Keys of the months that had a stored record
    pub months_with_data: Vec<MonthKey>,
}

/// Twelve months summed through their quarters, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearAggregate {
    pub year: i32,
    pub totals: Counts,
    pub by_city: ByRegion,
    pub quarters: Vec<QuarterAggregate>,
    pub months_with_data: Vec<MonthKey>,
}

/// The three overlapping windows around a reference month
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub monthly: Counts,
    pub quarterly: Counts,
    #[serde(rename = "last4Months")]
    pub last_four_months: Counts,
}
