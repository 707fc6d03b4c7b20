//! GPS time, the time representation used throughout the CM store.
//!
//! Every start/stop column holds whole GPS seconds. Conversions from civil
//! (UTC) time go through `hifitime` so leap seconds are accounted for.

use std::{fmt, str::FromStr, time::SystemTime};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Whole seconds since the GPS epoch (1980-01-06T00:00:00 UTC).
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct GpsTime(pub i64);

impl GpsTime {
  pub fn now() -> Self { Self::from_datetime(Utc::now()) }

  pub fn from_datetime(dt: DateTime<Utc>) -> Self {
    let unix =
      dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) * 1e-6;
    Self(Epoch::from_unix_seconds(unix).to_gpst_seconds().round() as i64)
  }

  /// Used for file modification times.
  pub fn from_system_time(t: SystemTime) -> Self {
    Self::from_datetime(DateTime::<Utc>::from(t))
  }

  pub fn to_datetime(self) -> Option<DateTime<Utc>> {
    let unix = Epoch::from_gpst_seconds(self.0 as f64).to_unix_seconds();
    DateTime::from_timestamp(unix.round() as i64, 0)
  }

  pub fn seconds(self) -> i64 { self.0 }

  pub fn abs_diff(self, other: GpsTime) -> u64 { self.0.abs_diff(other.0) }

  /// `start <= self` and (`stop` is open or `stop > self`).
  pub fn within(self, start: GpsTime, stop: Option<GpsTime>) -> bool {
    start <= self && stop.is_none_or(|stop| stop > self)
  }
}

impl fmt::Display for GpsTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Accepts `now`, integer GPS seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// (UTC) or `YYYY-MM-DD` (UTC midnight).
impl FromStr for GpsTime {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
      return Ok(Self::now());
    }
    if let Ok(secs) = s.parse::<i64>() {
      return Ok(Self(secs));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
      return Ok(Self::from_datetime(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
      return Ok(Self::from_datetime(dt.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
      && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
      return Ok(Self::from_datetime(midnight.and_utc()));
    }
    Err(Error::InvalidTime(s.to_owned()))
  }
}
