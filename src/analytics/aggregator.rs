//! Window aggregation over raw calendar events
//!
//! Classifies events into three overlapping windows around a reference month:
//!
//! - **monthly**: the reference month itself
//! - **quarterly**: the calendar quarter containing the reference month
//!   (fixed blocks Jan-Mar, Apr-Jun, Jul-Sep, Oct-Dec)
//! - **last 4 months**: a rolling window of the reference month and the three
//!   before it, compared on linear month indices so it crosses year
//!   boundaries without calendar arithmetic
//!
//! Each window is evaluated independently per event. Events without a
//! parseable date belong to no window.

use crate::analytics::models::WindowStats;
use crate::analytics::regions::RegionPalette;
use crate::models::{Event, MonthKey};

/// Span of the rolling window, reference month included
pub const ROLLING_WINDOW_MONTHS: i64 = 4;

/// Which windows a month falls into relative to `reference`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMembership {
    pub monthly: bool,
    pub quarterly: bool,
    pub last_four_months: bool,
}

impl WindowMembership {
    pub fn of(month: MonthKey, reference: MonthKey) -> Self {
        let distance = reference.linear() - month.linear();

        Self {
            monthly: month == reference,
            quarterly: month.year() == reference.year() && month.quarter() == reference.quarter(),
            last_four_months: (0..ROLLING_WINDOW_MONTHS).contains(&distance),
        }
    }
}

/// Count events per window, split into home and other regions
pub fn compute_windows(events: &[Event], palette: &RegionPalette, reference: MonthKey) -> WindowStats {
    let mut stats = WindowStats::default();

    for event in events {
        let Some(month) = event.month_key() else {
            continue;
        };

        let membership = WindowMembership::of(month, reference);
        let is_home = palette.is_home_region(event.region.as_deref());

        if membership.monthly {
            stats.monthly.record(is_home);
        }
        if membership.quarterly {
            stats.quarterly.record(is_home);
        }
        if membership.last_four_months {
            stats.last_four_months.record(is_home);
        }
    }

    stats
}
