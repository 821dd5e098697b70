use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MonthKey;

/// A calendar entry as supplied by the event-listing collaborator.
///
/// Only the date and the region matter here; any other fields in the
/// incoming JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// `YYYY-MM-DD`, no time and no timezone
    #[serde(default)]
    pub date: Option<String>,

    /// Free-text region label, `None` when unknown
    #[serde(default)]
    pub region: Option<String>,
}

impl Event {
    pub fn new(date: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            date: Some(date.into()),
            region: region.map(str::to_string),
        }
    }

    /// Parse the date as a naive calendar date. Malformed or missing dates
    /// yield `None`.
    pub fn naive_date(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    pub fn month_key(&self) -> Option<MonthKey> {
        self.naive_date().and_then(MonthKey::from_date)
    }
}

/// Request body carrying a list of events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<Event>,
}
