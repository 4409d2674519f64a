//! CF calendars and "<unit> since <epoch>" time encodings.
//!
//! Dates are converted through an absolute day number counted from
//! 0000-01-01 in the calendar of the date (astronomical year numbering, so
//! year 0 exists in every calendar). Gregorian dates go through
//! `chrono::NaiveDate`; the model calendars and Julian dates are counted
//! directly.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TseriesError, TseriesResult};

const SECONDS_PER_DAY: f64 = 86400.0;

const MONTH_DAYS_NOLEAP: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// CF calendar attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    /// `noleap` / `365_day`
    NoLeap,
    /// `all_leap` / `366_day`
    AllLeap,
    /// `360_day`
    Day360,
    /// `julian`
    Julian,
    /// `proleptic_gregorian`
    ProlepticGregorian,
    /// `standard` / `gregorian`: Julian before 1582-10-15, Gregorian after.
    Standard,
}

impl Calendar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
            Calendar::Julian => "julian",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Standard => "standard",
        }
    }

    /// Whether `year` has an extra day.
    ///
    /// For `standard`, years up to 1582 follow the Julian rule.
    pub fn is_leap(&self, year: i64) -> bool {
        match self {
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::ProlepticGregorian => gregorian_date(year, 2, 29).is_ok(),
            Calendar::Standard => {
                if year <= 1582 {
                    year.rem_euclid(4) == 0
                } else {
                    gregorian_date(year, 2, 29).is_ok()
                }
            }
        }
    }

    pub fn days_in_month(&self, year: i64, month: u32) -> u32 {
        if *self == Calendar::Day360 {
            return 30;
        }
        let idx = (month.clamp(1, 12) - 1) as usize;
        if month == 2 && self.is_leap(year) {
            29
        } else {
            MONTH_DAYS_NOLEAP[idx]
        }
    }

    /// Number of days in `year`. The 1582 transition year of `standard` has 355.
    pub fn days_in_year(&self, year: i64) -> u32 {
        match self {
            Calendar::Day360 => 360,
            Calendar::Standard if year == 1582 => 355,
            _ => {
                if self.is_leap(year) {
                    366
                } else {
                    365
                }
            }
        }
    }

    /// Absolute day number of a date, with 0000-01-01 as day 0.
    pub fn day_number(&self, year: i64, month: u32, day: u32) -> TseriesResult<i64> {
        if !(1..=12).contains(&month) {
            return Err(TseriesError::InvalidTime(format!("month {} out of range", month)));
        }
        match self {
            Calendar::Standard => {
                if (year, month, day) >= (1582, 10, 15) {
                    Calendar::ProlepticGregorian.day_number(year, month, day)
                } else if (year, month, day) >= (1582, 10, 5) {
                    Err(TseriesError::InvalidTime(format!(
                        "{:04}-{:02}-{:02} does not exist in the standard calendar",
                        year, month, day
                    )))
                } else {
                    Ok(Calendar::Julian.day_number(year, month, day)? + standard_offset()?)
                }
            }
            Calendar::ProlepticGregorian => {
                let date = gregorian_date(year, month, day)?;
                Ok(date.signed_duration_since(gregorian_epoch()?).num_days())
            }
            _ => {
                let dim = self.days_in_month(year, month);
                if day < 1 || day > dim {
                    return Err(TseriesError::InvalidTime(format!(
                        "day {} out of range for {:04}-{:02} ({})",
                        day,
                        year,
                        month,
                        self.as_str()
                    )));
                }
                let mut n = self.days_before_year(year);
                for m in 1..month {
                    n += self.days_in_month(year, m) as i64;
                }
                Ok(n + day as i64 - 1)
            }
        }
    }

    /// Inverse of [`Calendar::day_number`].
    pub fn from_day_number(&self, n: i64) -> TseriesResult<(i64, u32, u32)> {
        match self {
            Calendar::Standard => {
                if n >= gregorian_cutover()? {
                    Calendar::ProlepticGregorian.from_day_number(n)
                } else {
                    Calendar::Julian.from_day_number(n - standard_offset()?)
                }
            }
            Calendar::ProlepticGregorian => {
                let date = Duration::try_days(n)
                    .and_then(|offset| gregorian_epoch().ok()?.checked_add_signed(offset))
                    .ok_or_else(|| TseriesError::InvalidTime(format!("day {} out of range", n)))?;
                Ok((date.year() as i64, date.month(), date.day()))
            }
            _ => {
                let avg = match self {
                    Calendar::Day360 => 360.0,
                    Calendar::NoLeap => 365.0,
                    Calendar::AllLeap => 366.0,
                    _ => 365.25,
                };
                let mut year = (n as f64 / avg).floor() as i64;
                while self.days_before_year(year) > n {
                    year -= 1;
                }
                while self.days_before_year(year + 1) <= n {
                    year += 1;
                }
                let mut rem = n - self.days_before_year(year);
                let mut month = 1;
                while month < 12 {
                    let dim = self.days_in_month(year, month) as i64;
                    if rem < dim {
                        break;
                    }
                    rem -= dim;
                    month += 1;
                }
                Ok((year, month, rem as u32 + 1))
            }
        }
    }

    /// Days from 0000-01-01 to the first day of `year` in the calendars
    /// counted directly. Gregorian years never reach here.
    fn days_before_year(&self, year: i64) -> i64 {
        match self {
            Calendar::NoLeap => 365 * year,
            Calendar::AllLeap => 366 * year,
            Calendar::Day360 => 360 * year,
            _ => 365 * year + (year + 3).div_euclid(4),
        }
    }
}

fn gregorian_date(year: i64, month: u32, day: u32) -> TseriesResult<NaiveDate> {
    i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .ok_or_else(|| {
            TseriesError::InvalidTime(format!("{:04}-{:02}-{:02} is not a Gregorian date", year, month, day))
        })
}

fn gregorian_epoch() -> TseriesResult<NaiveDate> {
    gregorian_date(0, 1, 1)
}

/// Day number (proleptic Gregorian) of 1582-10-15.
fn gregorian_cutover() -> TseriesResult<i64> {
    Calendar::ProlepticGregorian.day_number(1582, 10, 15)
}

/// Shift that maps Julian day numbers onto the shared standard-calendar axis.
fn standard_offset() -> TseriesResult<i64> {
    // 1582-10-04 (Julian) is immediately followed by 1582-10-15 (Gregorian).
    Ok(gregorian_cutover()? - Calendar::Julian.day_number(1582, 10, 5)?)
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Calendar {
    type Err = TseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            "julian" => Ok(Calendar::Julian),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "standard" | "gregorian" => Ok(Calendar::Standard),
            other => Err(TseriesError::InvalidTime(format!("unknown calendar: {}", other))),
        }
    }
}

/// A calendar-aware datetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CfDatetime {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: f64,
    pub calendar: Calendar,
}

impl CfDatetime {
    pub fn new(calendar: Calendar, year: i64, month: u32, day: u32) -> TseriesResult<Self> {
        calendar.day_number(year, month, day)?;
        Ok(Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0.0,
            calendar,
        })
    }

    pub fn with_time(mut self, hour: u32, minute: u32, second: f64) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }

    /// Fractional days since 0000-01-01 in this datetime's calendar.
    pub fn absolute_days(&self) -> TseriesResult<f64> {
        let n = self.calendar.day_number(self.year, self.month, self.day)?;
        let secs = self.hour as f64 * 3600.0 + self.minute as f64 * 60.0 + self.second;
        Ok(n as f64 + secs / SECONDS_PER_DAY)
    }

    /// Inverse of [`CfDatetime::absolute_days`], rounded to the microsecond.
    pub fn from_absolute_days(calendar: Calendar, days: f64) -> TseriesResult<Self> {
        let mut n = days.floor() as i64;
        let mut secs = ((days - n as f64) * SECONDS_PER_DAY * 1e6).round() / 1e6;
        if secs >= SECONDS_PER_DAY {
            n += 1;
            secs -= SECONDS_PER_DAY;
        }
        let (year, month, day) = calendar.from_day_number(n)?;
        let hour = (secs / 3600.0).floor() as u32;
        let minute = ((secs - hour as f64 * 3600.0) / 60.0).floor() as u32;
        let second = secs - hour as f64 * 3600.0 - minute as f64 * 60.0;
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            calendar,
        })
    }

    /// Zero-based day of year.
    pub fn day_of_year(&self) -> TseriesResult<i64> {
        let n = self.calendar.day_number(self.year, self.month, self.day)?;
        let first = match self.calendar {
            Calendar::Standard if self.year == 1582 => Calendar::Julian.day_number(1582, 1, 1)? + standard_offset()?,
            cal => cal.day_number(self.year, 1, 1)?,
        };
        Ok(n - first)
    }
}

impl fmt::Display for CfDatetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second.floor() as u32
        )
    }
}

/// Unit of an encoded time offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Days => SECONDS_PER_DAY,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Days => "days",
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
        }
    }
}

/// A parsed `"<unit> since <epoch>"` time encoding in a given calendar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: CfDatetime,
}

impl TimeUnits {
    /// Parse CF time units such as `days since 0001-01-01 00:00:00`.
    pub fn parse(units: &str, calendar: Calendar) -> TseriesResult<Self> {
        let invalid = |msg: &str| TseriesError::InvalidTime(format!("{} in '{}'", msg, units));

        let (unit_str, epoch_str) = units
            .split_once(" since ")
            .ok_or_else(|| invalid("missing 'since'"))?;
        let unit = match unit_str.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "hr" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "sec" | "s" => TimeUnit::Seconds,
            _ => return Err(invalid("unknown time unit")),
        };

        let epoch_str = epoch_str.trim();
        let (date_part, time_part) = match epoch_str.split_once(|c: char| c == ' ' || c == 'T') {
            Some((d, t)) => (d, Some(t.trim())),
            None => (epoch_str, None),
        };

        let mut date_fields = date_part.splitn(3, '-');
        let mut next_date = |what: &str| -> TseriesResult<i64> {
            date_fields
                .next()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or_else(|| invalid(&format!("bad {}", what)))
        };
        let year = next_date("year")?;
        let month = next_date("month")? as u32;
        let day = next_date("day")? as u32;

        let mut epoch = CfDatetime::new(calendar, year, month, day)?;
        if let Some(t) = time_part {
            // drop a trailing time zone such as "Z" or "UTC"
            let t = t.split_whitespace().next().unwrap_or("").trim_end_matches('Z');
            if !t.is_empty() {
                let mut hms = t.split(':');
                let hour = hms.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let minute = hms.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let second = hms.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                epoch = epoch.with_time(hour, minute, second);
            }
        }

        Ok(Self { unit, epoch })
    }

    pub fn calendar(&self) -> Calendar {
        self.epoch.calendar
    }

    /// Encode a datetime as an offset from the epoch.
    pub fn encode(&self, dt: &CfDatetime) -> TseriesResult<f64> {
        let dt = if dt.calendar == self.calendar() {
            *dt
        } else {
            CfDatetime { calendar: self.calendar(), ..*dt }
        };
        let days = dt.absolute_days()? - self.epoch.absolute_days()?;
        Ok(days * SECONDS_PER_DAY / self.unit.seconds())
    }

    /// Decode an offset from the epoch into a datetime.
    pub fn decode(&self, value: f64) -> TseriesResult<CfDatetime> {
        if !value.is_finite() {
            return Err(TseriesError::InvalidTime(format!("cannot decode {}", value)));
        }
        let days = self.epoch.absolute_days()? + value * self.unit.seconds() / SECONDS_PER_DAY;
        CfDatetime::from_absolute_days(self.calendar(), days)
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} since {}", self.unit.as_str(), self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noleap_roundtrip_year_boundaries() {
        let units = TimeUnits::parse("days since 0001-01-01 00:00:00", Calendar::NoLeap).unwrap();
        assert_eq!(units.decode(365.0).unwrap().year, 2);
        let dt = CfDatetime::new(Calendar::NoLeap, 2, 3, 1).unwrap();
        assert_eq!(units.encode(&dt).unwrap(), 365.0 + 31.0 + 28.0);
        assert!(CfDatetime::new(Calendar::NoLeap, 4, 2, 29).is_err());
    }

    #[test]
    fn test_gregorian_leap_rules() {
        let cal = Calendar::ProlepticGregorian;
        assert!(cal.is_leap(2000));
        assert!(!cal.is_leap(1900));
        assert!(Calendar::Julian.is_leap(1900));
        let d1 = cal.day_number(1999, 12, 31).unwrap();
        let d2 = cal.day_number(2000, 1, 1).unwrap();
        assert_eq!(d2 - d1, 1);
        assert_eq!(cal.from_day_number(d2).unwrap(), (2000, 1, 1));
        assert_eq!(cal.from_day_number(cal.day_number(2000, 2, 29).unwrap()).unwrap(), (2000, 2, 29));
    }

    #[test]
    fn test_gregorian_day_numbers() {
        let cal = Calendar::ProlepticGregorian;
        // 0000 is a leap year, 0001-01-01 to 1970-01-01 is 719162 days
        assert_eq!(cal.day_number(1970, 1, 1).unwrap(), 719_528);
        assert_eq!(cal.from_day_number(719_528).unwrap(), (1970, 1, 1));
        assert_eq!(cal.days_in_month(1900, 2), 28);
        assert!(cal.day_number(2001, 2, 29).is_err());
        assert!(cal.from_day_number(i64::MAX / 2).is_err());
    }

    #[test]
    fn test_standard_calendar_gap() {
        let cal = Calendar::Standard;
        let before = cal.day_number(1582, 10, 4).unwrap();
        let after = cal.day_number(1582, 10, 15).unwrap();
        assert_eq!(after - before, 1);
        assert!(cal.day_number(1582, 10, 10).is_err());
        assert_eq!(cal.from_day_number(before).unwrap(), (1582, 10, 4));
        assert_eq!(cal.from_day_number(after).unwrap(), (1582, 10, 15));
    }

    #[test]
    fn test_hours_since_and_fractional_decode() {
        let units = TimeUnits::parse("hours since 1850-01-01", Calendar::Standard).unwrap();
        let dt = units.decode(36.0).unwrap();
        assert_eq!((dt.year, dt.month, dt.day, dt.hour), (1850, 1, 2, 12));
        assert_eq!(units.encode(&dt).unwrap(), 36.0);
    }

    #[test]
    fn test_day_360() {
        let units = TimeUnits::parse("days since 2000-01-01", Calendar::Day360).unwrap();
        let dt = units.decode(360.0 + 45.0).unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (2001, 2, 16));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TimeUnits::parse("days after 0001-01-01", Calendar::NoLeap).is_err());
        assert!(TimeUnits::parse("fortnights since 0001-01-01", Calendar::NoLeap).is_err());
        assert!("mayan".parse::<Calendar>().is_err());
        assert_eq!("365_day".parse::<Calendar>().unwrap(), Calendar::NoLeap);
        assert_eq!("gregorian".parse::<Calendar>().unwrap(), Calendar::Standard);
    }
}
