//! Part and connection records: the rows of the temporal CM store.
//!
//! Every record carries a start time and an optional stop time in GPS
//! seconds. Records are never rewritten; a removal is recorded by setting the
//! stop time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::GpsTime;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Canonical `"{HPN}:{REV}"` identity of a part.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartKey(String);

impl PartKey {
  pub fn new(hpn: &str, rev: &str) -> Self {
    Self(format!("{}:{}", canonical_name(hpn), canonical_name(rev)))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Split into `(hpn, rev)`.
  pub fn split(&self) -> (&str, &str) {
    self.0.rsplit_once(':').unwrap_or((self.0.as_str(), ""))
  }

  pub fn hpn(&self) -> &str { self.split().0 }
}

impl fmt::Display for PartKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Part numbers and revisions compare upper-case.
pub fn canonical_name(s: &str) -> String { s.trim().to_uppercase() }

/// Port names compare lower-case.
pub fn canonical_port(s: &str) -> String { s.trim().to_lowercase() }

// ─── Part ────────────────────────────────────────────────────────────────────

/// A physical (or logical) piece of hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
  pub hpn:                 String,
  pub hpn_rev:             String,
  /// Part type tag, e.g. `"antenna"`, `"feed"`, `"snap"`.
  pub hptype:              String,
  pub manufacturer_number: Option<String>,
  pub start_gpstime:       GpsTime,
  pub stop_gpstime:        Option<GpsTime>,
}

impl Part {
  pub fn new(hpn: &str, rev: &str, hptype: &str, start: GpsTime) -> Self {
    Self {
      hpn:                 hpn.to_owned(),
      hpn_rev:             rev.to_owned(),
      hptype:              hptype.to_owned(),
      manufacturer_number: None,
      start_gpstime:       start,
      stop_gpstime:        None,
    }
  }

  pub fn key(&self) -> PartKey { PartKey::new(&self.hpn, &self.hpn_rev) }

  pub fn is_active(&self, at: GpsTime) -> bool {
    at.within(self.start_gpstime, self.stop_gpstime)
  }

  /// HPN and revision upper-cased.
  pub fn canonicalize(mut self) -> Self {
    self.hpn = canonical_name(&self.hpn);
    self.hpn_rev = canonical_name(&self.hpn_rev);
    self
  }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// A dated signal-path link from an output port of one part to an input port
/// of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
  pub upstream_part:         String,
  pub up_part_rev:           String,
  pub upstream_output_port:  String,
  pub downstream_part:       String,
  pub down_part_rev:         String,
  pub downstream_input_port: String,
  pub start_gpstime:         GpsTime,
  pub stop_gpstime:          Option<GpsTime>,
}

impl Connection {
  /// Convenience constructor for an open-ended connection.
  pub fn new(
    upstream: (&str, &str, &str),
    downstream: (&str, &str, &str),
    start: GpsTime,
  ) -> Self {
    Self {
      upstream_part:         upstream.0.to_owned(),
      up_part_rev:           upstream.1.to_owned(),
      upstream_output_port:  upstream.2.to_owned(),
      downstream_part:       downstream.0.to_owned(),
      down_part_rev:         downstream.1.to_owned(),
      downstream_input_port: downstream.2.to_owned(),
      start_gpstime:         start,
      stop_gpstime:          None,
    }
  }

  pub fn upstream_key(&self) -> PartKey {
    PartKey::new(&self.upstream_part, &self.up_part_rev)
  }

  pub fn downstream_key(&self) -> PartKey {
    PartKey::new(&self.downstream_part, &self.down_part_rev)
  }

  pub fn is_active(&self, at: GpsTime) -> bool {
    at.within(self.start_gpstime, self.stop_gpstime)
  }

  /// Names upper-cased, ports lower-cased.
  pub fn canonicalize(mut self) -> Self {
    self.upstream_part = canonical_name(&self.upstream_part);
    self.up_part_rev = canonical_name(&self.up_part_rev);
    self.upstream_output_port = canonical_port(&self.upstream_output_port);
    self.downstream_part = canonical_name(&self.downstream_part);
    self.down_part_rev = canonical_name(&self.down_part_rev);
    self.downstream_input_port = canonical_port(&self.downstream_input_port);
    self
  }
}

impl fmt::Display for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}:{}<{}> -> {}:{}<{}> @{}",
      self.upstream_part,
      self.up_part_rev,
      self.upstream_output_port,
      self.downstream_part,
      self.down_part_rev,
      self.downstream_input_port,
      self.start_gpstime,
    )
  }
}

// ─── Side tables ─────────────────────────────────────────────────────────────

/// A free-text note attached to a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
  pub hpn:             String,
  pub hpn_rev:         String,
  pub comment:         String,
  pub posting_gpstime: GpsTime,
  /// Pointer to an external document, if any.
  pub reference:       Option<String>,
}

impl PartInfo {
  pub fn key(&self) -> PartKey { PartKey::new(&self.hpn, &self.hpn_rev) }
}

/// Operator-declared status of an antenna station over an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AprioriStatus {
  pub antenna:       String,
  /// e.g. `"passed_checks"`, `"dish_maintenance"`.
  pub status:        String,
  pub start_gpstime: GpsTime,
  pub stop_gpstime:  Option<GpsTime>,
}

impl AprioriStatus {
  pub fn is_active(&self, at: GpsTime) -> bool {
    at.within(self.start_gpstime, self.stop_gpstime)
  }
}

/// A surveyed station location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
  pub station_name:    String,
  pub station_type:    String,
  pub datum:           String,
  pub tile:            String,
  pub northing:        f64,
  pub easting:         f64,
  pub elevation:       f64,
  pub created_gpstime: GpsTime,
}

/// A modification-version record; the latest one dates the last change to
/// the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmVersion {
  pub update_time: GpsTime,
  pub git_hash:    Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn part_key_is_canonical() {
    let k = PartKey::new(" hh23 ", "a");
    assert_eq!(k.as_str(), "HH23:A");
    assert_eq!(k.split(), ("HH23", "A"));
    assert_eq!(k.hpn(), "HH23");
  }

  #[test]
  fn connection_canonicalize() {
    let c = Connection::new(("hh1", "a", "Ground"), ("A1", "h", "GROUND"), GpsTime(5))
      .canonicalize();
    assert_eq!(c.upstream_part, "HH1");
    assert_eq!(c.upstream_output_port, "ground");
    assert_eq!(c.down_part_rev, "H");
    assert_eq!(c.downstream_input_port, "ground");
    assert_eq!(c.upstream_key().as_str(), "HH1:A");
  }
}
