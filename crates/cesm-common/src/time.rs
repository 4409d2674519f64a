//! Interval midpoints, year-plus-fraction axes and provenance stamps.

use chrono::Utc;

use crate::calendar::{Calendar, CfDatetime, TimeUnits};
use crate::error::TseriesResult;

/// Reference encoding used to average decoded bounds.
const MIDPOINT_REFERENCE: &str = "days since 0001-01-01";

/// Midpoint of an encoded `[lower, upper]` interval.
pub fn midpoint_encoded(lower: f64, upper: f64) -> f64 {
    0.5 * (lower + upper)
}

/// Midpoint of a decoded interval.
///
/// Both edges are encoded against a fixed reference in their own calendar,
/// averaged, and decoded back. Averaging datetimes directly is never done.
pub fn midpoint_decoded(lower: &CfDatetime, upper: &CfDatetime) -> TseriesResult<CfDatetime> {
    let units = TimeUnits::parse(MIDPOINT_REFERENCE, lower.calendar)?;
    let mid = midpoint_encoded(units.encode(lower)?, units.encode(upper)?);
    units.decode(mid)
}

/// Year plus fraction of year for a datetime.
///
/// For the noleap calendar this equals `days since 0000-01-01 / 365`.
pub fn year_plus_frac(dt: &CfDatetime) -> TseriesResult<f64> {
    let doy = dt.day_of_year()? as f64;
    let secs = dt.hour as f64 * 3600.0 + dt.minute as f64 * 60.0 + dt.second;
    let year_len = dt.calendar.days_in_year(dt.year) as f64;
    Ok(dt.year as f64 + (doy + secs / 86400.0) / year_len)
}

/// Year plus fraction for encoded values.
pub fn year_plus_frac_encoded(values: &[f64], units: &str, calendar: &str) -> TseriesResult<Vec<f64>> {
    let calendar: Calendar = calendar.parse()?;
    let units = TimeUnits::parse(units, calendar)?;
    values
        .iter()
        .map(|&v| year_plus_frac(&units.decode(v)?))
        .collect()
}

/// Current UTC time formatted for history attributes.
pub fn history_datestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Prepend a `"<stamp>: created by <creator>"` line to an existing history.
pub fn prepend_history(existing: Option<&str>, creator: &str) -> String {
    let msg = format!("{}: created by {}", history_datestamp(), creator);
    match existing {
        Some(prior) if !prior.is_empty() => format!("{}\n{}", msg, prior),
        _ => msg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_decoded_january() {
        let lb = CfDatetime::new(Calendar::NoLeap, 1, 1, 1).unwrap();
        let ub = CfDatetime::new(Calendar::NoLeap, 1, 2, 1).unwrap();
        let mid = midpoint_decoded(&lb, &ub).unwrap();
        assert_eq!((mid.month, mid.day, mid.hour), (1, 16, 12));
    }

    #[test]
    fn test_midpoint_decoded_long_span() {
        // centuries-long spans must not overflow or lose the calendar
        let lb = CfDatetime::new(Calendar::NoLeap, 1, 1, 1).unwrap();
        let ub = CfDatetime::new(Calendar::NoLeap, 601, 1, 1).unwrap();
        let mid = midpoint_decoded(&lb, &ub).unwrap();
        assert_eq!((mid.year, mid.month, mid.day), (301, 1, 1));
        assert_eq!(mid.calendar, Calendar::NoLeap);
    }

    #[test]
    fn test_year_plus_frac_noleap() {
        let vals = year_plus_frac_encoded(&[0.0, 182.5, 365.0], "days since 0001-01-01", "noleap").unwrap();
        assert_eq!(vals[0], 1.0);
        assert!((vals[1] - 1.5).abs() < 1e-12);
        assert_eq!(vals[2], 2.0);
    }

    #[test]
    fn test_prepend_history() {
        let h = prepend_history(Some("older line"), "tseries");
        let mut lines = h.lines();
        assert!(lines.next().unwrap().ends_with(": created by tseries"));
        assert_eq!(lines.next(), Some("older line"));
        assert!(!prepend_history(None, "x").contains('\n'));
    }
}
