//! Orchestration around the pure aggregation core
//!
//! This is the only layer that looks at the wall clock: it resolves a missing
//! reference month to "now" and decides when a stored month is old enough to
//! be recomputed. The rollup store itself has no expiry.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analytics::aggregator::compute_windows;
use crate::analytics::error::StatsResult;
use crate::analytics::labels::WindowLabels;
use crate::analytics::models::{MonthlyAggregate, WindowStats};
use crate::analytics::regions::RegionPalette;
use crate::analytics::rollup::RollupStore;
use crate::analytics::summary::{months_with_events, summarize_month};
use crate::config::StatsConfig;
use crate::models::{Event, MonthKey};
use crate::storage::RollupStorage;

/// Live window statistics together with their display labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowReport {
    pub reference: MonthKey,
    pub labels: WindowLabels,
    #[serde(flatten)]
    pub windows: WindowStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Recomputed from the events and saved
    Refreshed(MonthlyAggregate),
    /// Stored copy was recent enough and left untouched
    Fresh(MonthlyAggregate),
}

impl RefreshOutcome {
    pub fn was_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed(_))
    }

    pub fn aggregate(&self) -> &MonthlyAggregate {
        match self {
            RefreshOutcome::Refreshed(aggregate) | RefreshOutcome::Fresh(aggregate) => aggregate,
        }
    }

    pub fn into_aggregate(self) -> MonthlyAggregate {
        match self {
            RefreshOutcome::Refreshed(aggregate) | RefreshOutcome::Fresh(aggregate) => aggregate,
        }
    }
}

/// Whether a month last written at `updated_at` should be recomputed.
/// Records that were never stamped are always stale.
pub fn needs_refresh(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match updated_at {
        Some(updated_at) => now - updated_at >= interval,
        None => true,
    }
}

pub struct StatsService {
    palette: Arc<RegionPalette>,
    store: RollupStore,
    refresh_interval: Duration,
}

impl StatsService {
    pub fn new(palette: Arc<RegionPalette>, store: RollupStore, refresh_interval: Duration) -> Self {
        Self {
            palette,
            store,
            refresh_interval,
        }
    }

    /// Standard colors with the configured home region and composition policy
    pub fn from_config(config: &StatsConfig, storage: Arc<dyn RollupStorage>) -> Self {
        let palette = RegionPalette::standard().with_home_region(config.home_region.as_str());
        let store = RollupStore::new(storage).with_policy(config.composition_policy);
        let secs = i64::try_from(config.refresh_interval_secs).unwrap_or(i64::MAX);
        let refresh_interval = Duration::seconds(secs.min(i64::MAX / 1000));

        Self::new(Arc::new(palette), store, refresh_interval)
    }

    pub fn palette(&self) -> &RegionPalette {
        &self.palette
    }

    pub fn store(&self) -> &RollupStore {
        &self.store
    }

    /// Window statistics around `reference`, or around the current month
    /// when none is given
    pub fn windows(&self, events: &[Event], reference: Option<MonthKey>) -> WindowReport {
        let reference = reference.unwrap_or_else(MonthKey::current);

        WindowReport {
            reference,
            labels: WindowLabels::for_month(reference),
            windows: compute_windows(events, &self.palette, reference),
        }
    }

    /// Recompute and save `month` from `events` unless the stored copy is
    /// younger than the refresh interval. `force` skips the age check.
    pub async fn refresh_month(
        &self,
        month: MonthKey,
        events: &[Event],
        force: bool,
    ) -> StatsResult<RefreshOutcome> {
        self.refresh_month_at(month, events, force, Utc::now()).await
    }

    pub(crate) async fn refresh_month_at(
        &self,
        month: MonthKey,
        events: &[Event],
        force: bool,
        now: DateTime<Utc>,
    ) -> StatsResult<RefreshOutcome> {
        if !force {
            if let Some(stored) = self.store.get_month(month).await? {
                if !needs_refresh(stored.updated_at, now, self.refresh_interval) {
                    debug!("Statistics for {} are fresh, skipping recompute", month);
                    return Ok(RefreshOutcome::Fresh(stored));
                }
            }
        }

        let aggregate = summarize_month(events, &self.palette, month);
        self.store.save_month(month, &aggregate).await?;

        // Read back so the caller sees the stamped timestamps
        let saved = self.store.get_month(month).await?.unwrap_or(aggregate);
        Ok(RefreshOutcome::Refreshed(saved))
    }

    /// Refresh every month that has at least one dated event, oldest first
    pub async fn snapshot_all(&self, events: &[Event], force: bool) -> StatsResult<Vec<RefreshOutcome>> {
        let months = months_with_events(events);
        let mut outcomes = Vec::with_capacity(months.len());

        for month in months {
            outcomes.push(self.refresh_month(month, events, force).await?);
        }

        let refreshed = outcomes.iter().filter(|o| o.was_refreshed()).count();
        info!(
            "Snapshot complete: {} months refreshed, {} already fresh",
            refreshed,
            outcomes.len() - refreshed
        );
        Ok(outcomes)
    }
}
