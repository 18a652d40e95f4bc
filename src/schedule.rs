//! Scheduled dispense times as shown on the display.

use chrono::NaiveTime;
use log::debug;

use crate::error::{DispenserError, Result};

const TIME_FORMAT: &str = "%I:%M %p";

/// Parses a `HH:MM AM/PM` time; the hour may be unpadded.
pub fn parse_schedule_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| DispenserError::parse(format!("'{raw}': {e}")))
}

/// Re-renders a stored time as zero-padded `HH:MM AM/PM`.
///
/// An empty value renders as `N/A`, anything unparseable as `Invalid`.
pub fn format_schedule_time(raw: &str) -> String {
    if raw.is_empty() {
        return "N/A".to_string();
    }
    match parse_schedule_time(raw) {
        Ok(time) => time.format(TIME_FORMAT).to_string(),
        Err(e) => {
            debug!("Time conversion failed: {e}");
            "Invalid".to_string()
        }
    }
}
