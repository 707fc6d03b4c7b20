//! The persisted hookup cache.
//!
//! A cache file is a snapshot of resolved hookups for the default station
//! list at one instant. It is read and written wholesale. Staleness is judged
//! against the store's latest modification-version record.

use std::{
  collections::BTreeMap,
  fs,
  io::Write as _,
  path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  Error, Result,
  active::hpn_matches,
  entry::HookupEntry,
  hookup::{HookupDossier, PolSelection},
  part::{CmVersion, canonical_name},
  time::GpsTime,
};

/// Bumped whenever the serialised layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ─── Cache file ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookupCache {
  pub format_version:  u32,
  /// When the cached hookups were resolved.
  pub at_date_gps:     GpsTime,
  /// The hookup type the cache was resolved under. `null` when every part
  /// picked its own topology from the checking order.
  pub hookup_type:     Option<String>,
  /// Station prefixes the cache was built for.
  pub hookup_list:     Vec<String>,
  pub hookup_dict:     BTreeMap<String, HookupEntry>,
  /// HPN → part type for every part active when the cache was built.
  pub part_type_cache: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct VersionProbe {
  format_version: Option<u32>,
}

/// Why a cache cannot answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Staleness {
  #[strum(to_string = "cache file is older than the last store change")]
  FileOlderThanVersion,
  #[strum(to_string = "cache was built before the last store change")]
  BuiltBeforeVersion,
  #[strum(to_string = "query time is not after the last store change")]
  QueryBeforeVersion,
  #[strum(to_string = "hookup type differs from the cached one")]
  HookupTypeChanged,
}

impl HookupCache {
  pub fn new(
    at_date_gps: GpsTime,
    hookup_type: Option<String>,
    hookup_list: Vec<String>,
    hookup_dict: HookupDossier,
    part_type_cache: BTreeMap<String, String>,
  ) -> Self {
    Self {
      format_version: CACHE_FORMAT_VERSION,
      at_date_gps,
      hookup_type,
      hookup_list,
      hookup_dict,
      part_type_cache,
    }
  }

  /// Load and validate a cache file.
  ///
  /// Any layout other than the current one is [`Error::CacheFormat`].
  pub fn read(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let format_error =
      |e: serde_json::Error| Error::CacheFormat(format!("{}: {e}", path.display()));

    let probe: VersionProbe = serde_json::from_str(&text).map_err(format_error)?;
    match probe.format_version {
      Some(CACHE_FORMAT_VERSION) => {}
      Some(other) => {
        return Err(Error::CacheFormat(format!(
          "{}: format version {other}, expected {CACHE_FORMAT_VERSION}",
          path.display()
        )));
      }
      None => {
        return Err(Error::CacheFormat(format!(
          "{}: no format version",
          path.display()
        )));
      }
    }

    serde_json::from_str(&text).map_err(format_error)
  }

  /// Replace the file at `path` with this cache.
  pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(self)?)?;
    info!(
      path = %path.display(),
      entries = self.hookup_dict.len(),
      at = %self.at_date_gps,
      "wrote hookup cache"
    );
    Ok(())
  }

  /// Why this cache cannot serve a query at `query_at`, if it cannot.
  ///
  /// Without a version record the store has never been marked modified and
  /// only the hookup type is compared.
  pub fn staleness(
    &self,
    query_at: GpsTime,
    hookup_type: Option<&str>,
    version: Option<&CmVersion>,
    file_modified: GpsTime,
  ) -> Option<Staleness> {
    if hookup_type != self.hookup_type.as_deref() {
      return Some(Staleness::HookupTypeChanged);
    }
    let changed = version?.update_time;
    if file_modified < changed {
      Some(Staleness::FileOlderThanVersion)
    } else if changed > self.at_date_gps {
      Some(Staleness::BuiltBeforeVersion)
    } else if changed >= query_at {
      Some(Staleness::QueryBeforeVersion)
    } else {
      None
    }
  }

  pub fn is_current(
    &self,
    query_at: GpsTime,
    hookup_type: Option<&str>,
    version: Option<&CmVersion>,
    file_modified: GpsTime,
  ) -> bool {
    self
      .staleness(query_at, hookup_type, version, file_modified)
      .is_none()
  }

  /// Whether every requested name falls under a cached station prefix.
  pub fn covers(&self, names: &[String]) -> bool {
    let prefixes: Vec<String> = self.hookup_list.iter().map(|p| canonical_name(p)).collect();
    names
      .iter()
      .map(|n| canonical_name(n))
      .all(|name| prefixes.iter().any(|p| name.starts_with(p.as_str())))
  }

  /// Cached entries for parts matching `names`, narrowed to `pol`.
  pub fn select(
    &self,
    names: &[String],
    exact_match: bool,
    pol: &PolSelection,
  ) -> HookupDossier {
    let names: Vec<String> = names.iter().map(|n| canonical_name(n)).collect();
    self
      .hookup_dict
      .iter()
      .filter(|(key, _)| {
        let hpn = key.rsplit_once(':').map_or(key.as_str(), |(hpn, _)| hpn);
        hpn_matches(hpn, &names, exact_match)
      })
      .map(|(key, entry)| {
        let mut entry = entry.clone();
        if let PolSelection::Only(pol) = pol {
          entry.retain_pol(pol);
        }
        (key.clone(), entry)
      })
      .collect()
  }
}

/// Modification time of a cache file, in GPS seconds.
pub fn file_modified(path: impl AsRef<Path>) -> Result<GpsTime> {
  let modified = fs::metadata(path)?.modified()?;
  Ok(GpsTime::from_system_time(modified))
}

// ─── Audit log ───────────────────────────────────────────────────────────────

/// One line of the cache audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLogRecord {
  pub recorded_at: DateTime<Utc>,
  pub at_date_gps: GpsTime,
  pub hookup_type: Option<String>,
  pub hookup_list: Vec<String>,
  pub entries:     usize,
  pub message:     String,
}

impl CacheLogRecord {
  pub fn for_cache(cache: &HookupCache, message: impl Into<String>) -> Self {
    Self {
      recorded_at: Utc::now(),
      at_date_gps: cache.at_date_gps,
      hookup_type: cache.hookup_type.clone(),
      hookup_list: cache.hookup_list.clone(),
      entries:     cache.hookup_dict.len(),
      message:     message.into(),
    }
  }

  /// Append this record as one JSON line.
  pub fn append_to(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(self)?;
    writeln!(file, "{line}")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entry::EntrySysdef;

  fn entry(key: &str, pols: &[&str]) -> HookupEntry {
    let mut entry = HookupEntry::new(key, EntrySysdef {
      hookup_type:   "parts_hera".into(),
      polarizations: pols.iter().map(|p| (*p).to_owned()).collect(),
    });
    for pol in pols {
      entry.hookup.insert((*pol).into(), vec![]);
      entry.fully_connected.insert((*pol).into(), false);
      entry.hookup_type.insert((*pol).into(), "parts_hera".into());
      entry.columns.insert((*pol).into(), vec!["station".into()]);
      entry.timing.insert((*pol).into(), Default::default());
    }
    entry
  }

  fn cache(at: i64) -> HookupCache {
    let dict = BTreeMap::from([
      ("HH1:A".to_owned(), entry("HH1:A", &["e", "n"])),
      ("HH12:A".to_owned(), entry("HH12:A", &["e", "n"])),
      ("HA3:A".to_owned(), entry("HA3:A", &["e", "n"])),
    ]);
    HookupCache::new(
      GpsTime(at),
      None,
      vec!["HH".into(), "HA".into()],
      dict,
      BTreeMap::from([("HH1".into(), "station".into())]),
    )
  }

  fn version(at: i64) -> CmVersion {
    CmVersion {
      update_time: GpsTime(at),
      git_hash:    None,
    }
  }

  #[test]
  fn unset_hookup_type_is_written_as_null() {
    let value = serde_json::to_value(cache(1000)).unwrap();
    assert_eq!(value["hookup_type"], serde_json::Value::Null);
    assert_eq!(value["format_version"], CACHE_FORMAT_VERSION);

    let typed = HookupCache {
      hookup_type: Some("parts_hera".into()),
      ..cache(1000)
    };
    let value = serde_json::to_value(&typed).unwrap();
    assert_eq!(value["hookup_type"], "parts_hera");
  }

  #[test]
  fn write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("hookup_cache.json");
    let original = cache(1000);
    original.write(&path).unwrap();

    assert_eq!(HookupCache::read(&path).unwrap(), original);
    assert!(file_modified(&path).unwrap() > GpsTime(1000));
  }

  #[test]
  fn other_format_versions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hookup_cache.json");
    let mut value = serde_json::to_value(cache(1000)).unwrap();
    value["format_version"] = serde_json::json!(0);
    fs::write(&path, value.to_string()).unwrap();

    assert!(matches!(HookupCache::read(&path), Err(Error::CacheFormat(_))));

    value.as_object_mut().unwrap().remove("format_version");
    fs::write(&path, value.to_string()).unwrap();
    assert!(matches!(HookupCache::read(&path), Err(Error::CacheFormat(_))));
  }

  #[test]
  fn entries_with_unexpected_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hookup_cache.json");
    let mut value = serde_json::to_value(cache(1000)).unwrap();
    value["hookup_dict"]["HH1:A"]["notes"] = serde_json::json!("legacy");
    fs::write(&path, value.to_string()).unwrap();

    match HookupCache::read(&path) {
      Err(Error::CacheFormat(msg)) => assert!(msg.contains("notes"), "{msg}"),
      other => panic!("expected format error, got {other:?}"),
    }
  }

  #[test]
  fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      HookupCache::read(dir.path().join("absent.json")),
      Err(Error::Io(_))
    ));
  }

  #[test]
  fn store_change_after_build_makes_cache_stale() {
    let c = cache(1000);
    let v = version(1005);
    assert!(!c.is_current(GpsTime(1010), None, Some(&v), GpsTime(1000)));
    assert!(!c.is_current(GpsTime(1010), None, Some(&v), GpsTime(1006)));
  }

  #[test]
  fn staleness_rules() {
    let c = cache(1000);
    let v = version(900);
    assert_eq!(c.staleness(GpsTime(1010), None, Some(&v), GpsTime(1001)), None);
    assert_eq!(
      c.staleness(GpsTime(1010), None, Some(&v), GpsTime(800)),
      Some(Staleness::FileOlderThanVersion)
    );
    assert_eq!(
      c.staleness(GpsTime(900), None, Some(&v), GpsTime(1001)),
      Some(Staleness::QueryBeforeVersion)
    );
    assert_eq!(
      c.staleness(GpsTime(1010), Some("parts_paper"), Some(&v), GpsTime(1001)),
      Some(Staleness::HookupTypeChanged)
    );
    assert!(c.is_current(GpsTime(5), None, None, GpsTime(0)));
  }

  #[test]
  fn coverage_requires_every_name() {
    let c = cache(1000);
    assert!(c.covers(&["hh1".into(), "HA".into()]));
    assert!(!c.covers(&["HH1".into(), "PAM1".into()]));
  }

  #[test]
  fn select_filters_names_and_pol() {
    let c = cache(1000);
    let prefix = c.select(&["HH1".into()], false, &PolSelection::All);
    // '2' sorts before ':', so the longer HPN comes first.
    assert_eq!(prefix.keys().collect::<Vec<_>>(), vec!["HH12:A", "HH1:A"]);

    let exact = c.select(&["hh1".into()], true, &PolSelection::Only("n".into()));
    assert_eq!(exact.keys().collect::<Vec<_>>(), vec!["HH1:A"]);
    assert_eq!(exact["HH1:A"].keys().collect::<Vec<_>>(), vec!["n"]);
  }

  #[test]
  fn audit_log_appends_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hookup_cache.log");
    let c = cache(1000);
    CacheLogRecord::for_cache(&c, "nightly").append_to(&path).unwrap();
    CacheLogRecord::for_cache(&c, "after rewiring").append_to(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let records: Vec<CacheLogRecord> = text
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].message, "after rewiring");
    assert_eq!(records[0].entries, 3);
  }
}
