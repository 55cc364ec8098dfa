use chrono::{DateTime, TimeZone, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Nanoseconds since the Unix epoch (or a virtual origin during backtests).
///
/// All engine-internal ordering and clock arithmetic happens on this type;
/// [`DateTime<Utc>`] is used only at the edges (CSV parsing, display).
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Default,
    Deserialize,
    Serialize,
    Display,
    From,
)]
pub struct TimestampNs(pub i64);

impl TimestampNs {
    pub const ZERO: TimestampNs = TimestampNs(0);

    /// Construct from whole milliseconds since epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Construct from whole seconds since epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Truncating conversion to whole milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0 / 1_000_000
    }

    /// Saturating addition of a nanosecond delta.
    pub fn plus_nanos(&self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Convert to a [`DateTime<Utc>`], saturating at the chrono range limits.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }
}

impl From<DateTime<Utc>> for TimestampNs {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversions() {
        let ts = TimestampNs::from_millis(1_500);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert_eq!(ts.as_millis(), 1_500);
        assert_eq!(TimestampNs::from_secs(2).as_millis(), 2_000);
    }

    #[test]
    fn test_datetime_round_trip() {
        let ts = TimestampNs::from_millis(1_700_000_000_000);
        let dt = ts.to_datetime();
        assert_eq!(TimestampNs::from(dt), ts);
    }

    #[test]
    fn test_plus_nanos_saturates() {
        assert_eq!(TimestampNs(i64::MAX).plus_nanos(1).0, i64::MAX);
    }
}
