//! The resolved hookup for one requested part.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{part::Connection, time::GpsTime};

/// Aggregate validity of a chain: the latest connection start and the
/// earliest connection stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timing {
  pub start: Option<GpsTime>,
  pub stop:  Option<GpsTime>,
}

impl Timing {
  pub fn of_chain(chain: &[Connection]) -> Self {
    Self {
      start: chain.iter().map(|c| c.start_gpstime).max(),
      stop:  chain.iter().filter_map(|c| c.stop_gpstime).min(),
    }
  }
}

/// The topology a hookup entry was resolved against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySysdef {
  pub hookup_type:   String,
  /// Polarizations requested for this entry.
  pub polarizations: Vec<String>,
}

/// Resolved signal chains for one part, keyed by hookup key (see
/// [`hookup_key`]).
///
/// The serialised form has exactly the fields below; anything else is a
/// format error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookupEntry {
  /// `HPN:REV` of the requested part.
  pub entry_key:       String,
  /// Ordered chains, upstream-most connection first.
  pub hookup:          BTreeMap<String, Vec<Connection>>,
  pub fully_connected: BTreeMap<String, bool>,
  pub hookup_type:     BTreeMap<String, String>,
  /// Part-type column headers per chain.
  pub columns:         BTreeMap<String, Vec<String>>,
  pub timing:          BTreeMap<String, Timing>,
  pub sysdef:          EntrySysdef,
}

impl HookupEntry {
  pub fn new(entry_key: impl Into<String>, sysdef: EntrySysdef) -> Self {
    Self {
      entry_key: entry_key.into(),
      hookup: BTreeMap::new(),
      fully_connected: BTreeMap::new(),
      hookup_type: BTreeMap::new(),
      columns: BTreeMap::new(),
      timing: BTreeMap::new(),
      sysdef,
    }
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.hookup.keys().map(String::as_str)
  }

  /// The widest column list across all chains, so heterogeneous chains share
  /// one header.
  pub fn column_headers(&self) -> &[String] {
    self
      .columns
      .values()
      .max_by_key(|cols| cols.len())
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn is_fully_connected(&self, key: &str) -> bool {
    self.fully_connected.get(key).copied().unwrap_or(false)
  }

  /// Keep only chains whose polarization is `pol`.
  pub fn retain_pol(&mut self, pol: &str) {
    let keep = |key: &String| key_pol(key).eq_ignore_ascii_case(pol);
    self.hookup.retain(|k, _| keep(k));
    self.fully_connected.retain(|k, _| keep(k));
    self.hookup_type.retain(|k, _| keep(k));
    self.columns.retain(|k, _| keep(k));
    self.timing.retain(|k, _| keep(k));
  }

  /// Move every chain under a new key.
  pub(crate) fn rekey(&mut self, rename: impl Fn(&str) -> String) {
    fn apply<V>(map: &mut BTreeMap<String, V>, rename: &impl Fn(&str) -> String) {
      *map = std::mem::take(map)
        .into_iter()
        .map(|(k, v)| (rename(&k), v))
        .collect();
    }
    apply(&mut self.hookup, &rename);
    apply(&mut self.fully_connected, &rename);
    apply(&mut self.hookup_type, &rename);
    apply(&mut self.columns, &rename);
    apply(&mut self.timing, &rename);
  }

  /// Fold another entry's chains into this one.
  pub(crate) fn absorb(&mut self, other: HookupEntry) {
    self.hookup.extend(other.hookup);
    self.fully_connected.extend(other.fully_connected);
    self.hookup_type.extend(other.hookup_type);
    self.columns.extend(other.columns);
    self.timing.extend(other.timing);
  }
}

/// `pol` when a polarization has a single starting port on the part,
/// otherwise `pol<port>`.
pub fn hookup_key(pol: &str, port: &str, single: bool) -> String {
  if single {
    pol.to_owned()
  } else {
    format!("{pol}<{port}>")
  }
}

/// The polarization a hookup key refers to.
pub fn key_pol(key: &str) -> &str {
  key.split(['<', '@']).next().unwrap_or(key)
}
