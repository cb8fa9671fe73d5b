use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MJD of the J2000.0 epoch (2000-01-01 12:00 TT, treated as UTC here).
pub const MJD_J2000: f64 = 51544.5;

/// Offset between Julian Date and Modified Julian Date.
pub const JD_MJD_OFFSET: f64 = 2_400_000.5;

const MJD_UNIX_EPOCH: f64 = 40587.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// An instant on the UTC day count sidereal time is computed from.
///
/// Stored as days since 1858-11-17 00:00 UTC, at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModifiedJulianDate(qtty::Days);

impl ModifiedJulianDate {
    pub fn new<V: Into<qtty::Days>>(days: V) -> Self {
        Self(days.into())
    }

    pub fn value(&self) -> f64 {
        self.0.value()
    }

    pub fn julian_date(&self) -> f64 {
        self.value() + JD_MJD_OFFSET
    }

    /// Days elapsed since J2000.0, the argument of the sidereal time series.
    pub fn days_since_j2000(&self) -> f64 {
        self.value() - MJD_J2000
    }

    /// `None` outside the range chrono can represent.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let millis = (self.value() - MJD_UNIX_EPOCH) * SECONDS_PER_DAY * 1000.0;
        if !millis.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(millis.round() as i64)
    }
}

impl From<f64> for ModifiedJulianDate {
    fn from(days: f64) -> Self {
        ModifiedJulianDate::new(qtty::Days::new(days))
    }
}

impl From<DateTime<Utc>> for ModifiedJulianDate {
    fn from(at: DateTime<Utc>) -> Self {
        let seconds = at.timestamp_millis() as f64 / 1000.0;
        ModifiedJulianDate::from(MJD_UNIX_EPOCH + seconds / SECONDS_PER_DAY)
    }
}
