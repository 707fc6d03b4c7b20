//! Point-in-time views of the CM store.
//!
//! An [`ActiveSet`] holds every part, connection, info note, apriori status
//! and station location whose validity interval contains a single instant,
//! indexed for the per-hop lookups the hookup resolver performs. It is never
//! mutated after construction.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::Arc,
};

use tracing::{debug, info};

use crate::{
  Error, Result,
  part::{AprioriStatus, Connection, GeoLocation, Part, PartInfo, PartKey, canonical_name},
  store::CmStore,
  sysdef::Direction,
  time::GpsTime,
};

/// Query times closer than this reuse the same [`ActiveSet`].
pub const TIME_TOLERANCE_SECS: u64 = 1;

/// port → connection, for one part on one side.
pub type PortMap = BTreeMap<String, Connection>;

// ─── ActiveSet ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
  at:          GpsTime,
  parts:       BTreeMap<PartKey, Part>,
  /// Connections whose upstream end is the part, keyed by its output port.
  up:          HashMap<PartKey, PortMap>,
  /// Connections whose downstream end is the part, keyed by its input port.
  down:        HashMap<PartKey, PortMap>,
  info:        HashMap<PartKey, Vec<PartInfo>>,
  apriori:     HashMap<String, AprioriStatus>,
  geo:         BTreeMap<String, GeoLocation>,
  connections: usize,
}

impl ActiveSet {
  /// Read everything active at `at` from `store`.
  pub async fn load<S: CmStore>(store: &S, at: GpsTime) -> Result<Self> {
    let parts = store.active_parts(at).await.map_err(Error::store)?;
    let connections = store.active_connections(at).await.map_err(Error::store)?;
    let info = store.active_part_info(at).await.map_err(Error::store)?;
    let apriori = store.active_apriori(at).await.map_err(Error::store)?;
    let geo = store.active_geo(at).await.map_err(Error::store)?;

    let set = Self::from_records(at, parts, connections, info, apriori, geo)?;
    info!(
      at = %at,
      parts = set.parts.len(),
      connections = set.connections,
      "loaded active set"
    );
    Ok(set)
  }

  /// Build a set from raw records, dropping anything not active at `at`.
  ///
  /// Fails with [`Error::DuplicateConnection`] if two active connections
  /// claim the same port of the same part.
  pub fn from_records(
    at: GpsTime,
    parts: Vec<Part>,
    connections: Vec<Connection>,
    info: Vec<PartInfo>,
    apriori: Vec<AprioriStatus>,
    geo: Vec<GeoLocation>,
  ) -> Result<Self> {
    let mut set = Self { at, ..Self::default() };

    for part in parts.into_iter().filter(|p| p.is_active(at)) {
      let part = part.canonicalize();
      // Overlapping revisions are a diagnostic matter (see `health`); the
      // later record wins here.
      if let Some(previous) = set.parts.insert(part.key(), part) {
        debug!(key = %previous.key(), "part listed twice in active set");
      }
    }

    for connection in connections.into_iter().filter(|c| c.is_active(at)) {
      set.add_connection(connection.canonicalize())?;
    }

    for note in info.into_iter().filter(|i| i.posting_gpstime <= at) {
      set.info.entry(note.key()).or_default().push(note);
    }
    for notes in set.info.values_mut() {
      notes.sort_by_key(|n| n.posting_gpstime);
    }

    for status in apriori.into_iter().filter(|s| s.is_active(at)) {
      set.apriori.insert(canonical_name(&status.antenna), status);
    }

    for location in geo.into_iter().filter(|g| g.created_gpstime <= at) {
      set.geo.insert(canonical_name(&location.station_name), location);
    }

    Ok(set)
  }

  fn add_connection(&mut self, connection: Connection) -> Result<()> {
    let up_key = connection.upstream_key();
    let down_key = connection.downstream_key();

    claim(
      &mut self.up,
      up_key,
      connection.upstream_output_port.clone(),
      Direction::Up,
      &connection,
    )?;
    claim(
      &mut self.down,
      down_key,
      connection.downstream_input_port.clone(),
      Direction::Down,
      &connection,
    )?;
    self.connections += 1;
    Ok(())
  }

  // ── Lookups ───────────────────────────────────────────────────────────

  /// The instant this set was built for.
  pub fn at(&self) -> GpsTime { self.at }

  pub fn part(&self, key: &PartKey) -> Option<&Part> { self.parts.get(key) }

  pub fn parts(&self) -> impl Iterator<Item = &Part> { self.parts.values() }

  pub fn connection_count(&self) -> usize { self.connections }

  /// Connections in which `key` sits at the `side` end, keyed by that part's
  /// port.
  pub fn connections_at(&self, side: Direction, key: &PartKey) -> Option<&PortMap> {
    match side {
      Direction::Up => self.up.get(key),
      Direction::Down => self.down.get(key),
    }
  }

  /// Distinct parts attached to `key` in `direction`, sorted by key.
  pub fn neighbors(&self, key: &PartKey, direction: Direction) -> Vec<PartKey> {
    let Some(ports) = self.connections_at(direction.opposite(), key) else {
      return Vec::new();
    };
    ports
      .values()
      .map(|c| match direction {
        Direction::Up => c.upstream_key(),
        Direction::Down => c.downstream_key(),
      })
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  pub fn info(&self, key: &PartKey) -> &[PartInfo] {
    self.info.get(key).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn apriori(&self, antenna: &str) -> Option<&AprioriStatus> {
    self.apriori.get(&canonical_name(antenna))
  }

  pub fn geo(&self, station: &str) -> Option<&GeoLocation> {
    self.geo.get(&canonical_name(station))
  }

  /// Active parts whose HPN starts with (or, with `exact_match`, equals) one
  /// of `names`, in key order.
  pub fn parts_matching(&self, names: &[String], exact_match: bool) -> Vec<&Part> {
    let names: Vec<String> = names.iter().map(|n| canonical_name(n)).collect();
    self
      .parts
      .values()
      .filter(|part| hpn_matches(&part.hpn, &names, exact_match))
      .collect()
  }
}

/// Whether `hpn` is selected by any of the (canonical) `names`.
pub fn hpn_matches(hpn: &str, names: &[String], exact_match: bool) -> bool {
  let hpn = canonical_name(hpn);
  names.iter().any(|name| {
    if exact_match {
      hpn == *name
    } else {
      hpn.starts_with(name.as_str())
    }
  })
}

fn claim(
  index: &mut HashMap<PartKey, PortMap>,
  key: PartKey,
  port: String,
  side: Direction,
  connection: &Connection,
) -> Result<()> {
  let ports = index.entry(key.clone()).or_default();
  if let Some(existing) = ports.get(&port) {
    return Err(Error::DuplicateConnection {
      part: key.to_string(),
      port,
      side,
      existing: existing.to_string(),
      duplicate: connection.to_string(),
    });
  }
  ports.insert(port, connection.clone());
  Ok(())
}

// ─── QueryContext ────────────────────────────────────────────────────────────

/// An immutable query instant paired with the active set for it.
///
/// Cloning is cheap; the set is shared.
#[derive(Debug, Clone)]
pub struct QueryContext {
  at:     GpsTime,
  active: Arc<ActiveSet>,
}

impl QueryContext {
  /// Build a context for `at`, reusing `previous`'s active set when it was
  /// built within [`TIME_TOLERANCE_SECS`] of `at`.
  pub async fn prepare<S: CmStore>(
    store: &S,
    at: GpsTime,
    previous: Option<&QueryContext>,
  ) -> Result<Self> {
    if let Some(previous) = previous
      && previous.active.at().abs_diff(at) <= TIME_TOLERANCE_SECS
    {
      debug!(at = %at, built_for = %previous.active.at(), "reusing active set");
      return Ok(Self {
        at,
        active: Arc::clone(&previous.active),
      });
    }
    let active = ActiveSet::load(store, at).await?;
    Ok(Self::from_active(at, active))
  }

  pub fn from_active(at: GpsTime, active: ActiveSet) -> Self {
    Self {
      at,
      active: Arc::new(active),
    }
  }

  pub fn at(&self) -> GpsTime { self.at }

  pub fn active(&self) -> &ActiveSet { &self.active }

  /// Whether two contexts share one active set.
  pub fn shares_active_set(&self, other: &QueryContext) -> bool {
    Arc::ptr_eq(&self.active, &other.active)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MemoryStore;

  fn conn(up: (&str, &str), down: (&str, &str), start: i64) -> Connection {
    Connection::new((up.0, "A", up.1), (down.0, "A", down.1), GpsTime(start))
  }

  #[test]
  fn only_records_active_at_the_instant_are_kept() {
    let mut stopped = Part::new("HH1", "A", "station", GpsTime(0));
    stopped.stop_gpstime = Some(GpsTime(100));
    let parts = vec![
      stopped,
      Part::new("HH2", "A", "station", GpsTime(0)),
      Part::new("HH3", "A", "station", GpsTime(500)),
    ];
    let mut old = conn(("HH2", "ground"), ("A2", "ground"), 0);
    old.stop_gpstime = Some(GpsTime(200));
    let connections = vec![old, conn(("HH2", "ground"), ("A7", "ground"), 200)];

    let at = GpsTime(200);
    let set = ActiveSet::from_records(at, parts, connections, vec![], vec![], vec![])
      .unwrap();

    for part in set.parts() {
      assert!(part.start_gpstime <= at);
      assert!(part.stop_gpstime.is_none_or(|s| s > at));
    }
    assert_eq!(set.parts().count(), 1);
    assert_eq!(set.connection_count(), 1);
    let ports = set
      .connections_at(Direction::Up, &PartKey::new("HH2", "A"))
      .unwrap();
    assert_eq!(ports["ground"].downstream_part, "A7");
  }

  #[test]
  fn connections_are_indexed_by_both_ends() {
    let set = ActiveSet::from_records(
      GpsTime(10),
      vec![],
      vec![conn(("hh1", "GROUND"), ("a1", "Ground"), 0)],
      vec![],
      vec![],
      vec![],
    )
    .unwrap();
    let up = set
      .connections_at(Direction::Up, &PartKey::new("HH1", "A"))
      .unwrap();
    assert!(up.contains_key("ground"));
    let down = set
      .connections_at(Direction::Down, &PartKey::new("A1", "A"))
      .unwrap();
    assert!(down.contains_key("ground"));
    assert_eq!(
      set.neighbors(&PartKey::new("HH1", "A"), Direction::Down),
      vec![PartKey::new("A1", "A")]
    );
    assert_eq!(
      set.neighbors(&PartKey::new("A1", "A"), Direction::Up),
      vec![PartKey::new("HH1", "A")]
    );
  }

  #[test]
  fn duplicate_upstream_port_is_an_integrity_error() {
    let result = ActiveSet::from_records(
      GpsTime(10),
      vec![],
      vec![
        conn(("STATIONX", "ground"), ("A1", "ground"), 0),
        conn(("STATIONX", "ground"), ("A2", "ground"), 5),
      ],
      vec![],
      vec![],
      vec![],
    );
    match result {
      Err(Error::DuplicateConnection { part, port, side, .. }) => {
        assert_eq!(part, "STATIONX:A");
        assert_eq!(port, "ground");
        assert_eq!(side, Direction::Up);
      }
      other => panic!("expected duplicate connection error, got {other:?}"),
    }
  }

  #[test]
  fn duplicate_downstream_port_is_an_integrity_error() {
    let result = ActiveSet::from_records(
      GpsTime(10),
      vec![],
      vec![
        conn(("HH1", "ground"), ("A1", "ground"), 0),
        conn(("HH2", "ground"), ("A1", "ground"), 0),
      ],
      vec![],
      vec![],
      vec![],
    );
    assert!(matches!(
      result,
      Err(Error::DuplicateConnection { side: Direction::Down, .. })
    ));
  }

  #[test]
  fn prefix_and_exact_matching() {
    let parts = ["HH230", "HH231", "HH23", "HH24"]
      .into_iter()
      .map(|n| Part::new(n, "A", "station", GpsTime(0)))
      .collect();
    let set =
      ActiveSet::from_records(GpsTime(1), parts, vec![], vec![], vec![], vec![])
        .unwrap();

    let prefix: Vec<&str> = set
      .parts_matching(&["hh23".to_owned()], false)
      .into_iter()
      .map(|p| p.hpn.as_str())
      .collect();
    assert_eq!(prefix, vec!["HH230", "HH231", "HH23"]);

    let exact: Vec<&str> = set
      .parts_matching(&["HH23".to_owned()], true)
      .into_iter()
      .map(|p| p.hpn.as_str())
      .collect();
    assert_eq!(exact, vec!["HH23"]);
  }

  #[test]
  fn side_tables_respect_time() {
    let info = vec![
      PartInfo {
        hpn:             "HH1".into(),
        hpn_rev:         "A".into(),
        comment:         "later".into(),
        posting_gpstime: GpsTime(50),
        reference:       None,
      },
      PartInfo {
        hpn:             "hh1".into(),
        hpn_rev:         "a".into(),
        comment:         "earlier".into(),
        posting_gpstime: GpsTime(5),
        reference:       None,
      },
      PartInfo {
        hpn:             "HH1".into(),
        hpn_rev:         "A".into(),
        comment:         "future".into(),
        posting_gpstime: GpsTime(500),
        reference:       None,
      },
    ];
    let apriori = vec![AprioriStatus {
      antenna:       "HH1".into(),
      status:        "passed_checks".into(),
      start_gpstime: GpsTime(0),
      stop_gpstime:  None,
    }];
    let set = ActiveSet::from_records(GpsTime(100), vec![], vec![], info, apriori, vec![])
      .unwrap();
    let notes: Vec<&str> = set
      .info(&PartKey::new("HH1", "A"))
      .iter()
      .map(|n| n.comment.as_str())
      .collect();
    assert_eq!(notes, vec!["earlier", "later"]);
    assert_eq!(set.apriori("hh1").unwrap().status, "passed_checks");
    assert!(set.geo("HH1").is_none());
  }

  #[tokio::test]
  async fn context_reuses_set_within_tolerance() {
    let store = MemoryStore::default();
    store.push_part(Part::new("HH1", "A", "station", GpsTime(0)));

    let first = QueryContext::prepare(&store, GpsTime(1000), None).await.unwrap();
    let near = QueryContext::prepare(&store, GpsTime(1001), Some(&first))
      .await
      .unwrap();
    assert!(near.shares_active_set(&first));
    assert_eq!(near.at(), GpsTime(1001));
    assert_eq!(store.loads(), 1);

    let far = QueryContext::prepare(&store, GpsTime(1003), Some(&near))
      .await
      .unwrap();
    assert!(!far.shares_active_set(&first));
    assert_eq!(store.loads(), 2);
  }

  #[tokio::test]
  async fn load_surfaces_duplicate_ports() {
    let store = MemoryStore::default();
    store.push_connection(conn(("STATIONX", "ground"), ("A1", "ground"), 0));
    store.push_connection(conn(("STATIONX", "ground"), ("A2", "ground"), 0));
    let result = ActiveSet::load(&store, GpsTime(10)).await;
    assert!(matches!(result, Err(Error::DuplicateConnection { .. })));
  }
}
