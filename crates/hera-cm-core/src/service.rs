//! [`HookupService`], the entry point the CLI and scripts call.
//!
//! The service owns a store handle, the topology definitions and the cache
//! settings. It holds no time-dependent state: every call names its instant,
//! and callers thread a [`QueryContext`] between calls to reuse an active set.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::{
  Error, Result,
  active::QueryContext,
  cache::{CacheLogRecord, HookupCache, Staleness, file_modified},
  health::{PartOverlap, PortOverlap, overlapping_connections, overlapping_parts},
  hookup::{HookupDossier, PolSelection, ResolveOptions, Resolver},
  store::CmStore,
  sysdef::Sysdef,
  time::GpsTime,
};

// ─── Settings and requests ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
  pub path:        PathBuf,
  /// JSON-lines audit log of cache rebuilds.
  pub audit_path:  PathBuf,
  /// Station prefixes resolved into the cache.
  pub hookup_list: Vec<String>,
  pub hookup_type: Option<String>,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      path:        PathBuf::from("hookup_cache.json"),
      audit_path:  PathBuf::from("hookup_cache.log"),
      hookup_list: vec!["HH".into(), "HA".into(), "HB".into()],
      hookup_type: None,
    }
  }
}

/// Parameters of one hookup query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookupRequest {
  pub names:        Vec<String>,
  pub pol:          PolSelection,
  pub at:           GpsTime,
  pub exact_match:  bool,
  pub hookup_type:  Option<String>,
  pub use_cache:    bool,
  pub strict_ports: bool,
}

impl HookupRequest {
  /// All polarizations, prefix matching, no cache.
  pub fn new(names: Vec<String>, at: GpsTime) -> Self {
    Self {
      names,
      pol: PolSelection::All,
      at,
      exact_match: false,
      hookup_type: None,
      use_cache: false,
      strict_ports: false,
    }
  }
}

/// The answer to a [`HookupRequest`].
#[derive(Debug, Clone)]
pub struct Resolved {
  pub dossier: HookupDossier,
  /// The context used for a fresh resolution; `None` when answered from
  /// the cache.
  pub context: Option<QueryContext>,
}

impl Resolved {
  pub fn from_cache(&self) -> bool { self.context.is_none() }
}

#[derive(Debug, thiserror::Error)]
enum CacheMiss {
  #[error("{0}")]
  Unreadable(#[from] Error),
  #[error("{0}")]
  Stale(Staleness),
  #[error("requested names fall outside the cached station list")]
  NotCovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheStatus {
  Missing,
  Unreadable {
    reason: String,
  },
  Loaded {
    at_date_gps: GpsTime,
    hookup_type: Option<String>,
    hookup_list: Vec<String>,
    entries:     usize,
    /// Why the cache would not be used for a query now, if it would not.
    stale:       Option<String>,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
  pub parts:       Vec<PartOverlap>,
  pub connections: Vec<PortOverlap>,
}

impl HealthReport {
  pub fn is_clean(&self) -> bool { self.parts.is_empty() && self.connections.is_empty() }
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct HookupService<S> {
  store:  S,
  sysdef: Sysdef,
  cache:  CacheSettings,
}

impl<S: CmStore> HookupService<S> {
  pub fn new(store: S, sysdef: Sysdef, cache: CacheSettings) -> Self {
    Self {
      store,
      sysdef,
      cache,
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn sysdef(&self) -> &Sysdef { &self.sysdef }

  pub fn cache_settings(&self) -> &CacheSettings { &self.cache }

  /// Resolve hookups for `request`.
  ///
  /// With `use_cache`, a current cache that covers every requested name
  /// answers the query. Any cache problem is logged and answered by a fresh
  /// resolution instead.
  pub async fn resolve(
    &self,
    request: &HookupRequest,
    previous: Option<&QueryContext>,
  ) -> Result<Resolved> {
    if request.use_cache {
      match self.from_cache(request).await {
        Ok(dossier) => {
          info!(entries = dossier.len(), "answered from hookup cache");
          return Ok(Resolved {
            dossier,
            context: None,
          });
        }
        Err(reason) => info!(%reason, "hookup cache not used; resolving fresh"),
      }
    }

    let context = QueryContext::prepare(&self.store, request.at, previous).await?;
    let options = ResolveOptions {
      strict_ports: request.strict_ports,
    };
    let dossier = Resolver::new(&self.sysdef, context.active(), options).resolve_names(
      &request.names,
      request.exact_match,
      &request.pol,
      request.hookup_type.as_deref(),
    )?;
    Ok(Resolved {
      dossier,
      context: Some(context),
    })
  }

  async fn from_cache(
    &self,
    request: &HookupRequest,
  ) -> Result<HookupDossier, CacheMiss> {
    let cache = HookupCache::read(&self.cache.path)?;
    if !cache.covers(&request.names) {
      return Err(CacheMiss::NotCovered);
    }
    let version = self.store.latest_version().await.map_err(Error::store)?;
    let modified = file_modified(&self.cache.path)?;
    if let Some(stale) = cache.staleness(
      request.at,
      request.hookup_type.as_deref(),
      version.as_ref(),
      modified,
    ) {
      return Err(CacheMiss::Stale(stale));
    }
    Ok(cache.select(&request.names, request.exact_match, &request.pol))
  }

  /// Rebuild the cache for the configured station list as of now.
  pub async fn write_cache(&self, message: &str) -> Result<CacheLogRecord> {
    self.write_cache_at(GpsTime::now(), message).await
  }

  pub async fn write_cache_at(&self, at: GpsTime, message: &str) -> Result<CacheLogRecord> {
    let context = QueryContext::prepare(&self.store, at, None).await?;
    let active = context.active();
    let dossier = Resolver::new(&self.sysdef, active, ResolveOptions::default())
      .resolve_names(
        &self.cache.hookup_list,
        false,
        &PolSelection::All,
        self.cache.hookup_type.as_deref(),
      )?;
    let part_types = active
      .parts()
      .map(|p| (p.hpn.clone(), p.hptype.clone()))
      .collect();

    let cache = HookupCache::new(
      at,
      self.cache.hookup_type.clone(),
      self.cache.hookup_list.clone(),
      dossier,
      part_types,
    );
    cache.write(&self.cache.path)?;

    let record = CacheLogRecord::for_cache(&cache, message);
    record.append_to(&self.cache.audit_path)?;
    Ok(record)
  }

  /// Summarise the cache file and whether a query at `at` could use it.
  pub async fn cache_status(&self, at: GpsTime) -> Result<CacheStatus> {
    if !self.cache.path.exists() {
      return Ok(CacheStatus::Missing);
    }
    let cache = match HookupCache::read(&self.cache.path) {
      Ok(cache) => cache,
      Err(e) => {
        return Ok(CacheStatus::Unreadable {
          reason: e.to_string(),
        });
      }
    };
    let version = self.store.latest_version().await.map_err(Error::store)?;
    let stale = cache
      .staleness(
        at,
        self.cache.hookup_type.as_deref(),
        version.as_ref(),
        file_modified(&self.cache.path)?,
      )
      .map(|s| s.to_string());

    Ok(CacheStatus::Loaded {
      at_date_gps: cache.at_date_gps,
      hookup_type: cache.hookup_type,
      hookup_list: cache.hookup_list,
      entries: cache.hookup_dict.len(),
      stale,
    })
  }

  /// Overlap diagnostics over the store's full history.
  pub async fn check(&self) -> Result<HealthReport> {
    let parts = self.store.list_parts().await.map_err(Error::store)?;
    let connections = self.store.list_connections().await.map_err(Error::store)?;
    let report = HealthReport {
      parts:       overlapping_parts(&parts),
      connections: overlapping_connections(&connections),
    };
    info!(
      part_overlaps = report.parts.len(),
      port_overlaps = report.connections.len(),
      "checked store history"
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;
  use crate::{
    part::Part,
    testing::{Fixture, MemoryStore, hera_station},
  };

  fn service(dir: &TempDir) -> HookupService<MemoryStore> {
    let fixture = hera_station(hera_station(Fixture::default(), 1), 2);
    HookupService::new(
      MemoryStore::with_fixture(fixture),
      Sysdef::hera_default(),
      CacheSettings {
        path:        dir.path().join("hookup_cache.json"),
        audit_path:  dir.path().join("hookup_cache.log"),
        hookup_list: vec!["HH".into()],
        hookup_type: None,
      },
    )
  }

  fn request(names: &[&str], at: i64) -> HookupRequest {
    HookupRequest::new(names.iter().map(|n| (*n).to_owned()).collect(), GpsTime(at))
  }

  #[tokio::test]
  async fn fresh_resolution_reuses_context() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);

    let first = svc.resolve(&request(&["HH"], 100), None).await.unwrap();
    assert_eq!(first.dossier.keys().collect::<Vec<_>>(), vec!["HH1:A", "HH2:A"]);
    assert!(!first.from_cache());

    let second = svc
      .resolve(&request(&["HH2"], 101), first.context.as_ref())
      .await
      .unwrap();
    assert_eq!(second.dossier.len(), 1);
    assert_eq!(svc.store().loads(), 1);
  }

  #[tokio::test]
  async fn current_cache_answers_covered_queries() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    svc.store().push_version(GpsTime(1000));
    let record = svc.write_cache_at(GpsTime(2000), "test build").await.unwrap();
    assert_eq!(record.entries, 2);

    let mut req = request(&["HH1"], 2500);
    req.use_cache = true;
    req.pol = PolSelection::Only("n".into());
    let cached = svc.resolve(&req, None).await.unwrap();
    assert!(cached.from_cache());
    assert_eq!(cached.dossier["HH1:A"].keys().collect::<Vec<_>>(), vec!["n"]);

    req.use_cache = false;
    let fresh = svc.resolve(&req, None).await.unwrap();
    assert_eq!(fresh.dossier["HH1:A"].hookup, cached.dossier["HH1:A"].hookup);
  }

  #[tokio::test]
  async fn stale_cache_falls_back_to_fresh_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    svc.write_cache_at(GpsTime(1000), "before rewiring").await.unwrap();
    svc.store().push_version(GpsTime(1005));

    let mut req = request(&["HH"], 1010);
    req.use_cache = true;
    let resolved = svc.resolve(&req, None).await.unwrap();
    assert!(!resolved.from_cache());
    assert_eq!(resolved.dossier.len(), 2);
  }

  #[tokio::test]
  async fn uncovered_names_bypass_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    svc.write_cache_at(GpsTime(1000), "build").await.unwrap();

    let mut req = request(&["HH1", "FDV1"], 1010);
    req.use_cache = true;
    let resolved = svc.resolve(&req, None).await.unwrap();
    assert!(!resolved.from_cache());
    assert!(resolved.dossier.contains_key("FDV1:A"));
  }

  #[tokio::test]
  async fn corrupt_cache_falls_back_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    assert_eq!(svc.cache_status(GpsTime(10)).await.unwrap(), CacheStatus::Missing);

    fs::write(&svc.cache_settings().path, r#"{"at_date_gps": 5}"#).unwrap();
    let mut req = request(&["HH"], 1010);
    req.use_cache = true;
    let resolved = svc.resolve(&req, None).await.unwrap();
    assert!(!resolved.from_cache());
    assert!(matches!(
      svc.cache_status(GpsTime(10)).await.unwrap(),
      CacheStatus::Unreadable { .. }
    ));
  }

  #[tokio::test]
  async fn cache_status_reports_staleness() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    svc.write_cache_at(GpsTime(1000), "build").await.unwrap();

    match svc.cache_status(GpsTime(1010)).await.unwrap() {
      CacheStatus::Loaded { entries, stale, .. } => {
        assert_eq!(entries, 2);
        assert_eq!(stale, None);
      }
      other => panic!("unexpected status {other:?}"),
    }

    svc.store().push_version(GpsTime(1005));
    match svc.cache_status(GpsTime(1010)).await.unwrap() {
      CacheStatus::Loaded { stale, .. } => assert!(stale.is_some()),
      other => panic!("unexpected status {other:?}"),
    }

    let log = fs::read_to_string(&svc.cache_settings().audit_path).unwrap();
    assert_eq!(log.lines().count(), 1);
  }

  #[tokio::test]
  async fn check_finds_overlapping_history() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    assert!(svc.check().await.unwrap().is_clean());

    svc.store().push_part(Part::new("HH1", "B", "station", GpsTime(50)));
    let report = svc.check().await.unwrap();
    assert_eq!(report.parts.len(), 1);
    assert_eq!(report.parts[0].hpn, "HH1");
  }
}
