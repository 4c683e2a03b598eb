//! Fixed UTC+5:30 (IST) time helpers.

use chrono::{DateTime, FixedOffset, Offset, Utc};

pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn ist_now() -> DateTime<FixedOffset> {
    to_ist(Utc::now())
}

pub fn to_ist(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&ist())
}

/// `YYYYMMDD_HHMMSS`, used in artifact names
pub fn file_stamp(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// `DD-MM-YYYY`
pub fn date_label(at: &DateTime<FixedOffset>) -> String {
    at.format("%d-%m-%Y").to_string()
}

/// `HH:MM:SS` on a 24h clock
pub fn time_label(at: &DateTime<FixedOffset>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// `hh:MM:SS AM` on a 12h clock
pub fn time_label_12h(at: &DateTime<FixedOffset>) -> String {
    at.format("%I:%M:%S %p").to_string()
}
