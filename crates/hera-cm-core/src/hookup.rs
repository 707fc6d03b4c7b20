//! Hookup resolution: reconstructing signal chains from dated connections.
//!
//! For every starting port of a requested part the resolver walks upstream
//! and downstream through the active connection graph, one hop at a time,
//! choosing the port that carries the requested polarization. The two walks
//! are joined into a single chain ordered upstream-most first and the chain's
//! part-type sequence is matched against the topology's complete patterns.

use std::{
  collections::{BTreeMap, HashSet},
  fmt,
  str::FromStr,
};

use tracing::{debug, warn};

use crate::{
  Error, Result,
  active::ActiveSet,
  entry::{EntrySysdef, HookupEntry, Timing, hookup_key},
  part::{Connection, Part, PartKey, canonical_port},
  sysdef::{Direction, PartRole, Sysdef, Topology},
};

/// Redirect parts may point at other redirect parts at most this deep.
pub const MAX_REDIRECT_DEPTH: usize = 4;

/// Resolved entries keyed by `HPN:REV`.
pub type HookupDossier = BTreeMap<String, HookupEntry>;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Which polarizations to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PolSelection {
  #[default]
  All,
  Only(String),
}

impl PolSelection {
  pub fn selects(&self, pol: &str) -> bool {
    match self {
      Self::All => true,
      Self::Only(only) => only.eq_ignore_ascii_case(pol),
    }
  }
}

impl FromStr for PolSelection {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = canonical_port(s);
    Ok(if s == "all" { Self::All } else { Self::Only(s) })
  }
}

impl fmt::Display for PolSelection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::All => f.write_str("all"),
      Self::Only(pol) => f.write_str(pol),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
  /// Raise [`Error::AmbiguousPort`] instead of ending the walk when a hop
  /// cannot be disambiguated.
  pub strict_ports: bool,
}

// ─── Hop state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Hop {
  direction: Direction,
  key:       PartKey,
  hpn:       String,
  part_type: String,
  pol:       String,
  port:      String,
  /// Ports of `part_type` that carry `pol`.
  allowed:   Vec<String>,
}

impl Hop {
  fn start(part: &Part, pol: &str, port: &str, allowed: Vec<String>) -> Self {
    Self {
      direction: Direction::Up,
      key:       part.key(),
      hpn:       part.hpn.clone(),
      part_type: part.hptype.clone(),
      pol:       pol.to_owned(),
      port:      port.to_owned(),
      allowed,
    }
  }

  fn advance(&mut self, next: &Part, port: String, allowed: Vec<String>) {
    self.key = next.key();
    self.hpn = next.hpn.clone();
    self.part_type = next.hptype.clone();
    self.port = port;
    self.allowed = allowed;
  }

  fn name_carries_pol(&self) -> bool {
    match (self.hpn.chars().last(), self.pol.chars().next()) {
      (Some(last), Some(pol)) => last.eq_ignore_ascii_case(&pol),
      _ => false,
    }
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves hookups against one active set.
pub struct Resolver<'a> {
  sysdef:  &'a Sysdef,
  active:  &'a ActiveSet,
  options: ResolveOptions,
}

impl<'a> Resolver<'a> {
  pub fn new(sysdef: &'a Sysdef, active: &'a ActiveSet, options: ResolveOptions) -> Self {
    Self {
      sysdef,
      active,
      options,
    }
  }

  /// Resolve every active part whose HPN matches `names`.
  ///
  /// A part that cannot be resolved (unknown type, redirect too deep) is
  /// logged and left out; configuration and integrity errors abort the batch.
  pub fn resolve_names(
    &self,
    names: &[String],
    exact_match: bool,
    pol: &PolSelection,
    hookup_type: Option<&str>,
  ) -> Result<HookupDossier> {
    self.sysdef.ensure_configured()?;
    if let Some(hint) = hookup_type {
      self.sysdef.topology(hint)?;
    }

    let mut dossier = HookupDossier::new();
    for part in self.active.parts_matching(names, exact_match) {
      let key = part.key();
      match self.resolve_part(&key, pol, hookup_type) {
        Ok(Some(entry)) => {
          dossier.insert(key.to_string(), entry);
        }
        Ok(None) => debug!(part = %key, "no hookup produced"),
        Err(e) if e.is_per_part() => warn!(part = %key, error = %e, "skipping part"),
        Err(e) => return Err(e),
      }
    }
    Ok(dossier)
  }

  /// Resolve a single active part.
  pub fn resolve_part(
    &self,
    key: &PartKey,
    pol: &PolSelection,
    hookup_type: Option<&str>,
  ) -> Result<Option<HookupEntry>> {
    self.resolve_at_depth(key, pol, hookup_type, 0)
  }

  fn resolve_at_depth(
    &self,
    key: &PartKey,
    pol: &PolSelection,
    hookup_type: Option<&str>,
    depth: usize,
  ) -> Result<Option<HookupEntry>> {
    let part = self
      .active
      .part(key)
      .ok_or_else(|| Error::PartNotFound(key.to_string()))?;

    let role = self.sysdef.classify(part, hookup_type)?;
    match &role {
      PartRole::Physical { hookup_type: resolved } => {
        self.resolve_physical(part, resolved, pol).map(Some)
      }
      PartRole::Redirect { .. } => {
        self.resolve_redirect(part, &role, pol, hookup_type, depth)
      }
    }
  }

  fn resolve_redirect(
    &self,
    part: &Part,
    role: &PartRole,
    pol: &PolSelection,
    hookup_type: Option<&str>,
    depth: usize,
  ) -> Result<Option<HookupEntry>> {
    let key = part.key();
    if depth >= MAX_REDIRECT_DEPTH {
      return Err(Error::RedirectDepth(key.to_string()));
    }

    let substitutes = self.sysdef.handle_redirect_part_types(role, &key, self.active);
    debug!(part = %key, ?substitutes, "resolving redirect part");
    let several = substitutes.len() > 1;

    let mut merged: Option<HookupEntry> = None;
    for substitute in &substitutes {
      let mut entry = match self.resolve_at_depth(substitute, pol, hookup_type, depth + 1) {
        Ok(Some(entry)) => entry,
        Ok(None) => continue,
        Err(Error::RedirectDepth(at)) => return Err(Error::RedirectDepth(at)),
        Err(e) if e.is_per_part() => {
          warn!(part = %key, substitute = %substitute, error = %e, "skipping substitute");
          continue;
        }
        Err(e) => return Err(e),
      };

      if several {
        let hpn = substitute.hpn().to_owned();
        entry.rekey(|k| format!("{k}@{hpn}"));
      }
      match merged.as_mut() {
        Some(target) => target.absorb(entry),
        None => {
          entry.entry_key = key.to_string();
          merged = Some(entry);
        }
      }
    }
    Ok(merged)
  }

  fn resolve_physical(
    &self,
    part: &Part,
    hookup_type: &str,
    pol: &PolSelection,
  ) -> Result<HookupEntry> {
    let topology = self.sysdef.topology(hookup_type)?;
    let pols: Vec<String> = topology
      .polarizations
      .iter()
      .filter(|p| pol.selects(p))
      .cloned()
      .collect();

    let mut entry = HookupEntry::new(part.key().to_string(), EntrySysdef {
      hookup_type:   hookup_type.to_owned(),
      polarizations: pols.clone(),
    });

    for (key, pol, port) in starting_ports(topology, self.active, part, &pols) {
      let chain = self.follow(part, hookup_type, &pol, &port)?;
      let types = self.type_sequence(part, &chain);
      let matched = topology.matching_complete_path(&types);

      entry.fully_connected.insert(key.clone(), matched.is_some());
      entry.columns.insert(key.clone(), matched.unwrap_or(types));
      entry.timing.insert(key.clone(), Timing::of_chain(&chain));
      entry.hookup_type.insert(key.clone(), hookup_type.to_owned());
      entry.hookup.insert(key, chain);
    }
    Ok(entry)
  }

  /// The full chain through `part` for one polarization, upstream-most
  /// first.
  fn follow(
    &self,
    part: &Part,
    hookup_type: &str,
    pol: &str,
    port: &str,
  ) -> Result<Vec<Connection>> {
    let allowed = self.sysdef.get_ports(hookup_type, pol, &part.hptype)?;
    let start = Hop::start(part, pol, port, allowed);

    let mut chain = self.walk(start.clone(), hookup_type)?;
    chain.reverse();

    let downstream = self.walk(
      Hop {
        direction: Direction::Down,
        ..start
      },
      hookup_type,
    )?;
    chain.extend(downstream);
    Ok(chain)
  }

  /// Follow connections in `hop.direction` until the chain ends.
  fn walk(&self, mut hop: Hop, hookup_type: &str) -> Result<Vec<Connection>> {
    let topology = self.sysdef.topology(hookup_type)?;
    let cap = self.active.connection_count() + 1;
    let mut visited: HashSet<(PartKey, String, Direction)> = HashSet::new();
    let mut chain = Vec::new();

    while let Some((port, connection)) = self.next_connection(&hop, topology)? {
      if chain.len() >= cap
        || !visited.insert((hop.key.clone(), port.clone(), hop.direction))
      {
        return Err(Error::TopologyCycle {
          part: hop.key.to_string(),
          port,
          direction: hop.direction,
        });
      }

      let (next_key, next_port) = match hop.direction {
        Direction::Up => (
          connection.upstream_key(),
          connection.upstream_output_port.clone(),
        ),
        Direction::Down => (
          connection.downstream_key(),
          connection.downstream_input_port.clone(),
        ),
      };
      let Some(next) = self.active.part(&next_key) else {
        debug!(from = %hop.key, to = %next_key, "connected part not active; chain ends");
        break;
      };

      debug!(
        direction = %hop.direction,
        pol = %hop.pol,
        from = %hop.key,
        port = %port,
        to = %next_key,
        "hop"
      );
      let allowed = self.sysdef.get_ports(hookup_type, &hop.pol, &next.hptype)?;
      hop.advance(next, next_port, allowed);
      chain.push(connection);
    }
    Ok(chain)
  }

  /// The connection leaving the hop's part in its direction, if one can be
  /// chosen.
  fn next_connection(
    &self,
    hop: &Hop,
    topology: &Topology,
  ) -> Result<Option<(String, Connection)>> {
    // Walking up leaves a part from a port where the part is the downstream
    // end, and vice versa.
    let Some(options) = self.active.connections_at(hop.direction.opposite(), &hop.key)
    else {
      return Ok(None);
    };

    let candidates: Vec<&str> = hop
      .allowed
      .iter()
      .map(String::as_str)
      .filter(|p| options.contains_key(*p))
      .collect();

    Ok(
      self
        .pick_port(hop, topology, &candidates)?
        .and_then(|port| options.get(port).map(|c| (port.to_owned(), c.clone()))),
    )
  }

  fn pick_port<'c>(
    &self,
    hop: &Hop,
    topology: &Topology,
    candidates: &[&'c str],
  ) -> Result<Option<&'c str>> {
    let Some(first) = candidates.first().copied() else {
      return Ok(None);
    };

    if topology.single_pol_labeled(&hop.part_type) && hop.name_carries_pol() {
      return Ok(Some(first));
    }
    if candidates.len() == 1 {
      return Ok(Some(first));
    }
    if let Some(port) = candidates.iter().copied().find(|p| *p == hop.port) {
      return Ok(Some(port));
    }
    let pol_initial = hop.pol.chars().next();
    if let Some(port) = candidates
      .iter()
      .copied()
      .find(|p| pol_initial.is_some() && p.chars().next() == pol_initial)
    {
      return Ok(Some(port));
    }

    if self.options.strict_ports {
      return Err(Error::AmbiguousPort {
        part:       hop.key.to_string(),
        pol:        hop.pol.clone(),
        direction:  hop.direction,
        candidates: candidates.iter().map(|p| (*p).to_owned()).collect(),
      });
    }
    warn!(
      part = %hop.key,
      pol = %hop.pol,
      direction = %hop.direction,
      ?candidates,
      "ambiguous port; chain ends here"
    );
    Ok(None)
  }

  /// Part types along the chain; just the starting part's type for an empty
  /// chain.
  fn type_sequence(&self, part: &Part, chain: &[Connection]) -> Vec<String> {
    let Some(first) = chain.first() else {
      return vec![part.hptype.clone()];
    };
    let type_of = |key: PartKey| {
      self
        .active
        .part(&key)
        .map(|p| p.hptype.clone())
        .unwrap_or_default()
    };
    std::iter::once(type_of(first.upstream_key()))
      .chain(chain.iter().map(|c| type_of(c.downstream_key())))
      .collect()
  }
}

/// `(hookup key, pol, port)` for each walk to start on a part.
///
/// Parts with polarised ports start once per wired polarised port of each
/// requested polarization. An unwired port would only re-walk a sibling's
/// chain, so it is skipped unless none of that polarization's ports is
/// wired. Other parts start once per polarization from their first port.
/// Keys name the port whenever the type declares several for a
/// polarization, wired or not.
fn starting_ports(
  topology: &Topology,
  active: &ActiveSet,
  part: &Part,
  pols: &[String],
) -> Vec<(String, String, String)> {
  let key = part.key();
  let wired = |port: &str| {
    [Direction::Up, Direction::Down].into_iter().any(|side| {
      active
        .connections_at(side, &key)
        .is_some_and(|ports| ports.contains_key(port))
    })
  };

  let polarized = topology.polarized_ports(&part.hptype);
  let mut starts = Vec::new();
  for pol in pols {
    let declared: Vec<String> = if polarized.is_empty() {
      vec![topology.first_port(&part.hptype).unwrap_or_default()]
    } else {
      polarized
        .iter()
        .filter(|(port_pol, _)| port_pol == pol)
        .map(|(_, port)| port.clone())
        .collect()
    };
    let single = declared.len() == 1;
    let in_use: Vec<String> = declared
      .iter()
      .filter(|p| wired(p.as_str()))
      .cloned()
      .collect();
    let ports = if in_use.is_empty() { declared } else { in_use };
    for port in ports {
      starts.push((hookup_key(pol, &port, single), pol.clone(), port));
    }
  }
  starts
}
