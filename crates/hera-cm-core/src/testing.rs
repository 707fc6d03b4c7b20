//! In-memory [`CmStore`] and fixture builders for unit tests.

use std::{
  convert::Infallible,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use crate::{
  active::ActiveSet,
  part::{AprioriStatus, CmVersion, Connection, GeoLocation, Part, PartInfo, PartKey},
  store::CmStore,
  time::GpsTime,
};

// ─── MemoryStore ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MemoryStore {
  parts:       Mutex<Vec<Part>>,
  connections: Mutex<Vec<Connection>>,
  info:        Mutex<Vec<PartInfo>>,
  apriori:     Mutex<Vec<AprioriStatus>>,
  geo:         Mutex<Vec<GeoLocation>>,
  versions:    Mutex<Vec<CmVersion>>,
  loads:       AtomicUsize,
}

impl MemoryStore {
  pub fn push_part(&self, part: Part) { self.parts.lock().unwrap().push(part); }

  pub fn push_connection(&self, connection: Connection) {
    self.connections.lock().unwrap().push(connection);
  }

  pub fn push_version(&self, update_time: GpsTime) {
    self.versions.lock().unwrap().push(CmVersion {
      update_time,
      git_hash: None,
    });
  }

  /// Fill the store from a fixture.
  pub fn with_fixture(fixture: Fixture) -> Self {
    let store = Self::default();
    *store.parts.lock().unwrap() = fixture.parts;
    *store.connections.lock().unwrap() = fixture.connections;
    store
  }

  /// Number of active-part reads, i.e. active-set loads.
  pub fn loads(&self) -> usize { self.loads.load(Ordering::SeqCst) }
}

impl CmStore for MemoryStore {
  type Error = Infallible;

  async fn add_part(&self, part: Part) -> Result<(), Infallible> {
    self.push_part(part);
    Ok(())
  }

  async fn stop_part(&self, key: PartKey, at: GpsTime) -> Result<(), Infallible> {
    for part in self.parts.lock().unwrap().iter_mut() {
      if part.key() == key {
        part.stop_gpstime = Some(at);
      }
    }
    Ok(())
  }

  async fn add_connection(&self, connection: Connection) -> Result<(), Infallible> {
    self.push_connection(connection);
    Ok(())
  }

  async fn stop_connection(
    &self,
    connection: Connection,
    at: GpsTime,
  ) -> Result<(), Infallible> {
    for c in self.connections.lock().unwrap().iter_mut() {
      if *c == connection {
        c.stop_gpstime = Some(at);
      }
    }
    Ok(())
  }

  async fn add_part_info(&self, info: PartInfo) -> Result<(), Infallible> {
    self.info.lock().unwrap().push(info);
    Ok(())
  }

  async fn add_apriori(&self, status: AprioriStatus) -> Result<(), Infallible> {
    self.apriori.lock().unwrap().push(status);
    Ok(())
  }

  async fn add_geo(&self, location: GeoLocation) -> Result<(), Infallible> {
    self.geo.lock().unwrap().push(location);
    Ok(())
  }

  async fn record_version(&self, version: CmVersion) -> Result<(), Infallible> {
    self.versions.lock().unwrap().push(version);
    Ok(())
  }

  async fn active_parts(&self, at: GpsTime) -> Result<Vec<Part>, Infallible> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    let parts = self.parts.lock().unwrap();
    Ok(parts.iter().filter(|p| p.is_active(at)).cloned().collect())
  }

  async fn active_connections(&self, at: GpsTime) -> Result<Vec<Connection>, Infallible> {
    let connections = self.connections.lock().unwrap();
    Ok(connections.iter().filter(|c| c.is_active(at)).cloned().collect())
  }

  async fn active_part_info(&self, at: GpsTime) -> Result<Vec<PartInfo>, Infallible> {
    let info = self.info.lock().unwrap();
    Ok(info.iter().filter(|i| i.posting_gpstime <= at).cloned().collect())
  }

  async fn active_apriori(&self, at: GpsTime) -> Result<Vec<AprioriStatus>, Infallible> {
    let apriori = self.apriori.lock().unwrap();
    Ok(apriori.iter().filter(|s| s.is_active(at)).cloned().collect())
  }

  async fn active_geo(&self, at: GpsTime) -> Result<Vec<GeoLocation>, Infallible> {
    let geo = self.geo.lock().unwrap();
    Ok(geo.iter().filter(|g| g.created_gpstime <= at).cloned().collect())
  }

  async fn latest_version(&self) -> Result<Option<CmVersion>, Infallible> {
    let versions = self.versions.lock().unwrap();
    Ok(versions.iter().max_by_key(|v| v.update_time).cloned())
  }

  async fn list_parts(&self) -> Result<Vec<Part>, Infallible> {
    Ok(self.parts.lock().unwrap().clone())
  }

  async fn list_connections(&self) -> Result<Vec<Connection>, Infallible> {
    Ok(self.connections.lock().unwrap().clone())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Parts (revision `A`, started at 0) and the open connections between them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Fixture {
  pub parts:       Vec<Part>,
  pub connections: Vec<Connection>,
}

impl Fixture {
  pub fn part(mut self, hpn: &str, hptype: &str) -> Self {
    self.parts.push(Part::new(hpn, "A", hptype, GpsTime(0)));
    self
  }

  pub fn link(mut self, up: (&str, &str), down: (&str, &str)) -> Self {
    self.connections.push(Connection::new(
      (up.0, "A", up.1),
      (down.0, "A", down.1),
      GpsTime(0),
    ));
    self
  }

  pub fn build(self, at: GpsTime) -> ActiveSet {
    ActiveSet::from_records(at, self.parts, self.connections, vec![], vec![], vec![])
      .unwrap()
  }
}

/// A complete `parts_hera` signal path for station `HH{n}`, both
/// polarizations, ending at node `N{n}`.
pub(crate) fn hera_station(fixture: Fixture, n: u32) -> Fixture {
  let hh = format!("HH{n}");
  let ant = format!("A{n}");
  let fdv = format!("FDV{n}");
  let fem = format!("FEM{n}");
  let rfof = format!("RFOF{n}");
  let pam = format!("PAM{n}");
  let snp = format!("SNP{n}");
  let node = format!("N{n}");

  fixture
    .part(&hh, "station")
    .part(&ant, "antenna")
    .part(&fdv, "feed")
    .part(&fem, "front-end")
    .part(&rfof, "cable-rfof")
    .part(&pam, "post-amp")
    .part(&snp, "snap")
    .part(&node, "node")
    .link((&hh, "ground"), (&ant, "ground"))
    .link((&ant, "focus"), (&fdv, "input"))
    .link((&fdv, "terminals"), (&fem, "input"))
    .link((&fem, "e"), (&rfof, "e"))
    .link((&fem, "n"), (&rfof, "n"))
    .link((&rfof, "e"), (&pam, "e"))
    .link((&rfof, "n"), (&pam, "n"))
    .link((&pam, "e"), (&snp, "e2"))
    .link((&pam, "n"), (&snp, "n0"))
    .link((&snp, "rack"), (&node, "loc0"))
}
