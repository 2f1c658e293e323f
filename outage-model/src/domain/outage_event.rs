use serde::{Deserialize, Serialize};
use time::{format_description::BorrowedFormatItem, macros::format_description, PrimitiveDateTime};

/// Timezone-free ISO-8601, e.g. `2002-06-01T14:30:00`.
pub const ISO_LOCAL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

time::serde::format_description!(pub iso_local, PrimitiveDateTime, ISO_LOCAL_FORMAT);

/// Renders a datetime exactly as it is serialized.
pub fn to_iso_local(dt: PrimitiveDateTime) -> String {
    dt.format(ISO_LOCAL_FORMAT).unwrap_or_else(|_| dt.to_string())
}

/// Column order of the normalized CSV output.
pub const FIELD_NAMES: [&str; 12] = [
    "date",
    "time",
    "restoration_time",
    "outage_type",
    "region",
    "area_affected",
    "utility_name",
    "demand_loss_mw",
    "customers_affected",
    "start_datetime",
    "restored_datetime",
    "duration_minutes",
];

/// A single reported power outage.
///
/// The raw fields come straight from the yearly summaries. `start_datetime`,
/// `restored_datetime` and `duration_minutes` are derived later and stay
/// `None` until augmentation has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageEvent {
    /// Reported date, usually `m/d/YY` (older files) or `YYYY-MM-DD` (spreadsheets).
    pub date: String,
    /// Reported start time, `H:MM a.m.` style or `HH:MM:SS`.
    pub time: Option<String>,
    /// Free-text restoration description.
    pub restoration_time: Option<String>,
    pub outage_type: String,
    /// NERC region code.
    pub region: Option<String>,
    pub area_affected: Option<String>,
    pub utility_name: Option<String>,
    pub demand_loss_mw: Option<u64>,
    pub customers_affected: Option<u64>,
    #[serde(with = "iso_local::option", default)]
    pub start_datetime: Option<PrimitiveDateTime>,
    #[serde(with = "iso_local::option", default)]
    pub restored_datetime: Option<PrimitiveDateTime>,
    pub duration_minutes: Option<i64>,
}

impl OutageEvent {
    pub fn new(date: impl Into<String>, outage_type: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: None,
            restoration_time: None,
            outage_type: outage_type.into(),
            region: None,
            area_affected: None,
            utility_name: None,
            demand_loss_mw: None,
            customers_affected: None,
            start_datetime: None,
            restored_datetime: None,
            duration_minutes: None,
        }
    }

    /// True once both derived datetimes are known.
    pub fn has_span(&self) -> bool {
        self.start_datetime.is_some() && self.restored_datetime.is_some()
    }
}
