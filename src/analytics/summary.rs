//! Builds the per-month aggregate that gets persisted in the rollup store

use crate::analytics::models::{ByRegion, MonthlyAggregate, RegionEntry};
use crate::analytics::regions::RegionPalette;
use crate::models::{Event, MonthKey};

/// Summarize the events dated in `month`: home/other counts plus a
/// per-region breakdown with display colors. Timestamps are left for the
/// store to stamp.
pub fn summarize_month(events: &[Event], palette: &RegionPalette, month: MonthKey) -> MonthlyAggregate {
    let mut aggregate = MonthlyAggregate::empty(month);

    for event in events.iter().filter(|event| event.month_key() == Some(month)) {
        let region = event.region.as_deref();
        aggregate.monthly.record(palette.is_home_region(region));
        tally(&mut aggregate.by_city, palette, region);
    }

    aggregate
}

fn tally(by_city: &mut ByRegion, palette: &RegionPalette, region: Option<&str>) {
    let label = palette.breakdown_label(region);
    by_city
        .entry(label.to_string())
        .and_modify(|entry| entry.count += 1)
        .or_insert_with(|| RegionEntry {
            count: 1,
            color: palette.color_for_region(region).to_string(),
        });
}

/// Distinct months that have at least one dated event, oldest first
pub fn months_with_events(events: &[Event]) -> Vec<MonthKey> {
    let mut months: Vec<MonthKey> = events.iter().filter_map(Event::month_key).collect();
    months.sort_unstable();
    months.dedup();
    months
}
