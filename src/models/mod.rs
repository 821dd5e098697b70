pub mod event;
pub mod month_key;

pub use event::{Event, EventBatch};
pub use month_key::{MonthKey, MonthKeyError};
