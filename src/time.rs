use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use hifitime::Epoch;

/// Calendar date of MJD 0.
fn mjd_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1858, 11, 17)
}

/// Calendar date of a modified julian date, time of day truncated.
///
/// Arguments
/// ---------
/// * `mjd`: modified julian date (days)
///
/// Return
/// ------
/// * `None` if `mjd` is not finite or falls outside the representable range
pub fn mjd_to_date(mjd: f64) -> Option<NaiveDate> {
    if !mjd.is_finite() {
        return None;
    }
    let days = TimeDelta::try_days(mjd.floor() as i64)?;
    mjd_epoch()?.checked_add_signed(days)
}

/// Date and time of day of a modified julian date, to the second.
pub fn mjd_to_datetime(mjd: f64) -> Option<NaiveDateTime> {
    if !mjd.is_finite() {
        return None;
    }
    let millis = TimeDelta::try_milliseconds((mjd * 86_400_000.0).round() as i64)?;
    mjd_epoch()?.and_hms_opt(0, 0, 0)?.checked_add_signed(millis)
}

/// Parse the `YYYY-MM-DD` prefix of an ISO-8601-like timestamp.
pub fn iso_to_date(timestamp: &str) -> Option<NaiveDate> {
    let prefix = timestamp.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Transformation from an ISO-8601 UTC timestamp (`YYYY-MM-DDTHH:MM:SS[.fff]`)
/// to modified julian date.
pub fn iso_to_mjd(timestamp: &str) -> Option<f64> {
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return None;
    }
    match Epoch::from_str(timestamp) {
        Ok(epoch) => Some(epoch.to_mjd_utc_days()),
        Err(_) => {
            // Date-only stamps count from midnight.
            let date = iso_to_date(timestamp).filter(|_| timestamp.len() == 10)?;
            let days = date.signed_duration_since(mjd_epoch()?).num_days();
            Some(days as f64)
        }
    }
}

/// Elapsed hours of every timestamp relative to the earliest one.
pub fn elapsed_hours(mjd: &[f64]) -> Option<Vec<f64>> {
    if mjd.is_empty() || mjd.iter().any(|t| !t.is_finite()) {
        return None;
    }
    let t0 = mjd.iter().copied().fold(f64::INFINITY, f64::min);
    Some(mjd.iter().map(|t| (t - t0) * 24.0).collect())
}

/// Date token of a file name, e.g. `..._TU2024-01-15T10-32-07_...` → 2024-01-15.
pub fn date_from_file_name(file_name: &str) -> Option<NaiveDate> {
    file_name
        .match_indices("TU")
        .find_map(|(i, _)| iso_to_date(file_name.get(i + 2..)?))
}
