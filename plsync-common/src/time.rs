//! Timestamp utilities
//!
//! Scanners never read the system clock themselves: the caller supplies "now"
//! (and with it the time zone) through a [`TimeWindow`]. Provider timestamps are
//! normalized into that zone and compared as naive local times.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};

/// Get current local timestamp
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Where a provider timestamp falls relative to a [`TimeWindow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// At or after the cutoff
    Inside,
    /// Strictly before the cutoff
    Before,
    /// No timestamp recorded; callers treat this as inside the window
    Undated,
    /// Timestamp present but not parseable
    Unparseable,
}

/// Trailing time window ending at an injected "now"
#[derive(Debug, Clone)]
pub struct TimeWindow<Tz: TimeZone> {
    tz: Tz,
    cutoff: NaiveDateTime,
    days: u32,
}

impl<Tz: TimeZone> TimeWindow<Tz> {
    /// Window covering the `days` days before `now`
    ///
    /// A window reaching past the earliest representable time starts there.
    pub fn trailing_days(now: &DateTime<Tz>, days: u32) -> Self {
        let cutoff = now
            .naive_local()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(NaiveDateTime::MIN);
        Self {
            tz: now.timezone(),
            cutoff,
            days,
        }
    }

    /// Window length in days
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Earliest naive local time still inside the window
    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }

    /// True if `at` (naive local time) is at or after the cutoff
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.cutoff
    }

    /// Release dates compare at midnight of the (first) release day
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.and_hms_opt(0, 0, 0)
            .map(|at| self.contains(at))
            .unwrap_or(false)
    }

    /// Normalize an ISO 8601 timestamp into this window's zone
    ///
    /// Offset-carrying timestamps (`2024-05-01T10:00:00Z`, `...+02:00`) are
    /// converted into the window's zone. Timestamps without an offset are taken
    /// to be local already.
    pub fn normalize(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&self.tz).naive_local());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }

    /// Classify an optional provider timestamp
    pub fn position(&self, raw: Option<&str>) -> WindowPosition {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return WindowPosition::Undated;
        };
        match self.normalize(raw) {
            Some(at) if self.contains(at) => WindowPosition::Inside,
            Some(_) => WindowPosition::Before,
            None => WindowPosition::Unparseable,
        }
    }
}

/// Parse a release date with year, year-month or full-date precision
///
/// Partial dates normalize to the first day of the period:
/// `2021` -> 2021-01-01, `2021-06` -> 2021-06-01.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    match raw.len() {
        4 => {
            let year = raw.parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
        7 => {
            let (year, month) = raw.split_once('-')?;
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
        _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
    }
}
