//! Display labels for statistics windows

use serde::Serialize;

use crate::models::MonthKey;

const MONTH_NAMES: [&str; 12] = [
    "Январь",
    "Февраль",
    "Март",
    "Апрель",
    "Май",
    "Июнь",
    "Июль",
    "Август",
    "Сентябрь",
    "Октябрь",
    "Ноябрь",
    "Декабрь",
];

/// Localized month name, `"—"` outside 1-12
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| MONTH_NAMES.get(index as usize))
        .copied()
        .unwrap_or("—")
}

/// `"Q2 2025"`
pub fn quarter_label(key: MonthKey) -> String {
    format!("Q{} {}", key.quarter(), key.year())
}

/// Label of the rolling window of four months ending at `key`.
///
/// `"Март – Июнь 2025"` within one year, `"Октябрь 2024 – Январь 2025"`
/// across a year boundary.
pub fn last_four_months_label(key: MonthKey) -> String {
    let start = key.shift(-3).unwrap_or(key);
    let end_name = month_name(key.month());
    let start_name = month_name(start.month());

    if start.year() == key.year() {
        format!("{} – {} {}", start_name, end_name, key.year())
    } else {
        format!(
            "{} {} – {} {}",
            start_name,
            start.year(),
            end_name,
            key.year()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowLabels {
    pub month: String,
    pub quarter: String,
    #[serde(rename = "last4Months")]
    pub last_four_months: String,
}

impl WindowLabels {
    pub fn for_month(key: MonthKey) -> Self {
        Self {
            month: format!("{} {}", month_name(key.month()), key.year()),
            quarter: quarter_label(key),
            last_four_months: last_four_months_label(key),
        }
    }
}
