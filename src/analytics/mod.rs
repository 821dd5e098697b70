//! Choir event statistics
//!
//! Pure aggregation of calendar events into time windows (`aggregator`),
//! region classification (`regions`), monthly rollups persisted through the
//! storage layer and composed into quarters and years (`rollup`), and the
//! thin orchestration that ties them to the wall clock (`refresh`).

pub mod aggregator;
pub mod error;
pub mod labels;
pub mod models;
pub mod refresh;
pub mod regions;
pub mod rollup;
pub mod summary;

pub use aggregator::{compute_windows, WindowMembership};
pub use error::{StatsError, StatsResult};
pub use labels::WindowLabels;
pub use models::{
    ByRegion, Counts, MonthlyAggregate, QuarterAggregate, RegionEntry, WindowStats, YearAggregate,
};
pub use refresh::{needs_refresh, RefreshOutcome, StatsService, WindowReport};
pub use regions::{color_for_region, is_home_region, RegionPalette};
pub use rollup::{CompositionPolicy, MonthEntry, RollupStore};
pub use summary::summarize_month;
