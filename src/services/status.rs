use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::bar::BarRecord;

pub const DISABLED_MESSAGE: &str = "Announcement is disabled";
pub const MISSING_DATES_MESSAGE: &str = "Please select start and end dates to make this bar active";
pub const UNREADABLE_DATES_MESSAGE: &str = "Start or end date could not be read, please select it again";

/// Display status of a bar at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarStatus {
    Disabled,
    Scheduled,
    Active,
    Expired,
}

/// Badge colours shown next to a bar in the admin list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub background: &'static str,
    pub text: &'static str,
}

impl BarStatus {
    pub fn label(self) -> &'static str {
        match self {
            BarStatus::Disabled => "Disabled",
            BarStatus::Scheduled => "Scheduled",
            BarStatus::Active => "Active",
            BarStatus::Expired => "Expired",
        }
    }

    pub fn badge(self) -> StatusBadge {
        let (background, text) = match self {
            BarStatus::Active => ("#dcfce7", "#166534"),
            BarStatus::Scheduled => ("#e0f2fe", "#075985"),
            BarStatus::Expired => ("#fee2e2", "#991b1b"),
            BarStatus::Disabled => ("#f3f4f6", "#6b7280"),
        };
        StatusBadge { background, text }
    }
}

impl fmt::Display for BarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A bar without two readable dates is not schedulable yet and counts as
/// disabled. The window is inclusive on both ends.
pub fn evaluate_status(bar: &BarRecord, now: DateTime<Utc>) -> BarStatus {
    if !bar.enabled {
        return BarStatus::Disabled;
    }
    let Some((start, end)) = bar.window() else {
        return BarStatus::Disabled;
    };

    if now < start {
        BarStatus::Scheduled
    } else if now > end {
        BarStatus::Expired
    } else {
        BarStatus::Active
    }
}

/// Hint shown under a bar that cannot be displayed as configured.
pub fn evaluate_status_message(bar: &BarRecord) -> Option<&'static str> {
    if !bar.enabled {
        Some(DISABLED_MESSAGE)
    } else if !bar.has_dates() {
        Some(MISSING_DATES_MESSAGE)
    } else if bar.window().is_none() {
        Some(UNREADABLE_DATES_MESSAGE)
    } else {
        None
    }
}
