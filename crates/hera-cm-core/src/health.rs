//! Consistency checks over the full history of the store.
//!
//! The resolver assumes at most one active record per part and per port at
//! any instant. These checks find the places where the history breaks that.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
  part::{Connection, Part, PartKey, canonical_name, canonical_port},
  sysdef::Direction,
  time::GpsTime,
};

/// Two records for the same HPN whose active intervals overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartOverlap {
  pub hpn:    String,
  pub first:  Part,
  pub second: Part,
}

/// Two connections claiming the same port of the same part at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortOverlap {
  pub part:   PartKey,
  pub port:   String,
  /// `Up` when the part is the upstream end of both connections.
  pub side:   Direction,
  pub first:  Connection,
  pub second: Connection,
}

fn overlaps(
  (a_start, a_stop): (GpsTime, Option<GpsTime>),
  (b_start, b_stop): (GpsTime, Option<GpsTime>),
) -> bool {
  a_stop.is_none_or(|stop| b_start < stop) && b_stop.is_none_or(|stop| a_start < stop)
}

/// Every pair of part records (any revision) for one HPN that are active at
/// the same time.
pub fn overlapping_parts(parts: &[Part]) -> Vec<PartOverlap> {
  let mut by_hpn: BTreeMap<String, Vec<&Part>> = BTreeMap::new();
  for part in parts {
    by_hpn.entry(canonical_name(&part.hpn)).or_default().push(part);
  }

  let mut found = Vec::new();
  for (hpn, mut records) in by_hpn {
    records.sort_by_key(|p| p.start_gpstime);
    for (i, a) in records.iter().enumerate() {
      for b in &records[i + 1..] {
        if overlaps(
          (a.start_gpstime, a.stop_gpstime),
          (b.start_gpstime, b.stop_gpstime),
        ) {
          found.push(PartOverlap {
            hpn:    hpn.clone(),
            first:  (*a).clone(),
            second: (*b).clone(),
          });
        }
      }
    }
  }
  found
}

/// Every pair of connections that hold the same port of the same part at the
/// same time, on either end.
pub fn overlapping_connections(connections: &[Connection]) -> Vec<PortOverlap> {
  let mut by_port: BTreeMap<(PartKey, String, Direction), Vec<&Connection>> =
    BTreeMap::new();
  for c in connections {
    by_port
      .entry((c.upstream_key(), canonical_port(&c.upstream_output_port), Direction::Up))
      .or_default()
      .push(c);
    by_port
      .entry((
        c.downstream_key(),
        canonical_port(&c.downstream_input_port),
        Direction::Down,
      ))
      .or_default()
      .push(c);
  }

  let mut found = Vec::new();
  for ((part, port, side), mut claims) in by_port {
    claims.sort_by_key(|c| c.start_gpstime);
    for (i, a) in claims.iter().enumerate() {
      for b in &claims[i + 1..] {
        if overlaps(
          (a.start_gpstime, a.stop_gpstime),
          (b.start_gpstime, b.stop_gpstime),
        ) {
          found.push(PortOverlap {
            part: part.clone(),
            port: port.clone(),
            side,
            first: (*a).clone(),
            second: (*b).clone(),
          });
        }
      }
    }
  }
  found
}
