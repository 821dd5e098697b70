//! Region classification and display colors
//!
//! A [`RegionPalette`] is built once and never mutated. The standard palette
//! is available process-wide through [`RegionPalette::standard`]; callers that
//! need another home region (or tests that need a tiny map) build their own.

use std::collections::HashMap;
use std::sync::OnceLock;

/// The region every other region is contrasted against
pub const HOME_REGION: &str = "Воронежская область";

/// Label used in per-region breakdowns for events without a region
pub const UNKNOWN_REGION_LABEL: &str = "Не указан";

/// Color for events with no region at all
pub const UNKNOWN_REGION_COLOR: &str = "#BDBDBD";

/// Color for a region label that is not in the palette
pub const OTHER_REGION_COLOR: &str = "#78909C";

const STANDARD_COLORS: &[(&str, &str)] = &[
    ("Воронежская область", "#E53935"),
    ("Белгородская область", "#1E88E5"),
    ("Курская область", "#43A047"),
    ("Липецкая область", "#FB8C00"),
    ("Тамбовская область", "#8E24AA"),
    ("Ростовская область", "#00ACC1"),
    ("Волгоградская область", "#6D4C41"),
    ("Саратовская область", "#C0CA33"),
    ("Орловская область", "#3949AB"),
    ("Брянская область", "#00897B"),
    ("Тульская область", "#D81B60"),
    ("Рязанская область", "#5E35B1"),
    ("Пензенская область", "#F4511E"),
    ("Московская область", "#039BE5"),
    ("Москва", "#FDD835"),
    ("Санкт-Петербург", "#7CB342"),
    ("Краснодарский край", "#FFB300"),
];

static STANDARD: OnceLock<RegionPalette> = OnceLock::new();

/// Immutable region -> color table with a designated home region
#[derive(Debug, Clone)]
pub struct RegionPalette {
    home_region: String,
    colors: HashMap<String, String>,
    unknown_color: String,
    other_color: String,
}

impl RegionPalette {
    pub fn new<I, K, V>(home_region: impl Into<String>, colors: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            home_region: home_region.into(),
            colors: colors
                .into_iter()
                .map(|(region, color)| (region.into(), color.into()))
                .collect(),
            unknown_color: UNKNOWN_REGION_COLOR.to_string(),
            other_color: OTHER_REGION_COLOR.to_string(),
        }
    }

    /// The built-in palette, constructed on first use
    pub fn standard() -> &'static RegionPalette {
        STANDARD.get_or_init(|| RegionPalette::new(HOME_REGION, STANDARD_COLORS.iter().copied()))
    }

    /// Same colors, different home region
    pub fn with_home_region(&self, home_region: impl Into<String>) -> Self {
        Self {
            home_region: home_region.into(),
            ..self.clone()
        }
    }

    /// Exact-match lookup with two fallback tiers: no region at all, and a
    /// region the palette does not know.
    pub fn color_for_region(&self, region: Option<&str>) -> &str {
        match region.map(str::trim) {
            None | Some("") => self.unknown_color.as_str(),
            Some(_) => region
                .and_then(|label| self.colors.get(label))
                .map(String::as_str)
                .unwrap_or(self.other_color.as_str()),
        }
    }

    pub fn is_home_region(&self, region: Option<&str>) -> bool {
        match region {
            Some(label) if !label.is_empty() => label == self.home_region,
            _ => false,
        }
    }

    /// Key under which an event's region is tallied in a breakdown
    pub fn breakdown_label<'a>(&self, region: Option<&'a str>) -> &'a str {
        match region {
            Some(label) if !label.trim().is_empty() => label,
            _ => UNKNOWN_REGION_LABEL,
        }
    }
}

/// [`RegionPalette::color_for_region`] on the standard palette
pub fn color_for_region(region: Option<&str>) -> &'static str {
    RegionPalette::standard().color_for_region(region)
}

/// [`RegionPalette::is_home_region`] on the standard palette
pub fn is_home_region(region: Option<&str>) -> bool {
    RegionPalette::standard().is_home_region(region)
}
