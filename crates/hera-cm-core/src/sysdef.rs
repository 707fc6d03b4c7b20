//! System topology definitions.
//!
//! A [`Sysdef`] names one or more hookup topologies (`parts_hera`,
//! `parts_paper`, ...). Each topology lists its part types in signal-flow
//! order together with the port names on their upstream and downstream
//! sides, the polarization labels, and the part types that are only logical
//! aliases for other hardware.

use std::{
  borrow::Cow,
  collections::{BTreeMap, BTreeSet},
};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  active::ActiveSet,
  part::{Part, PartKey, canonical_port},
};

// ─── Direction ───────────────────────────────────────────────────────────────

/// Direction of travel along the signal path.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
  Up,
  Down,
}

impl Direction {
  pub fn opposite(self) -> Self {
    match self {
      Self::Up => Self::Down,
      Self::Down => Self::Up,
    }
  }
}

// ─── Topology ────────────────────────────────────────────────────────────────

/// The ports of one part type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTypeDef {
  pub name: String,
  /// Input ports (signal arrives from upstream).
  #[serde(default)]
  pub up:   Vec<String>,
  /// Output ports (signal leaves downstream).
  #[serde(default)]
  pub down: Vec<String>,
}

impl PartTypeDef {
  pub fn new(name: &str, up: &[&str], down: &[&str]) -> Self {
    Self {
      name: name.to_owned(),
      up:   up.iter().map(|p| (*p).to_owned()).collect(),
      down: down.iter().map(|p| (*p).to_owned()).collect(),
    }
  }

  /// Up-side ports then down-side ports, first occurrence wins.
  fn ports(&self) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    self
      .up
      .iter()
      .chain(&self.down)
      .map(String::as_str)
      .filter(|p| seen.insert(*p))
      .collect()
  }
}

/// One named sub-system topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
  /// Polarization labels, e.g. `["e", "n"]`.
  pub polarizations:            Vec<String>,
  /// Part types in signal-flow order, upstream-most first.
  pub part_types:               Vec<PartTypeDef>,
  /// Logical part types and the side on which their substitutes hang.
  #[serde(default)]
  pub redirect_part_types:      BTreeMap<String, Direction>,
  /// Part types whose names already end in their polarization letter.
  #[serde(default)]
  pub single_pol_labeled_parts: BTreeSet<String>,
  /// Part-type sequences counted as a complete hookup. Empty means the full
  /// connection path is the only complete pattern.
  #[serde(default)]
  pub complete_paths:           Vec<Vec<String>>,
}

impl Topology {
  pub fn part_type(&self, name: &str) -> Option<&PartTypeDef> {
    self.part_types.iter().find(|pt| pt.name == name)
  }

  pub fn defines(&self, part_type: &str) -> bool {
    self.part_type(part_type).is_some()
  }

  /// The polarization a port belongs to, or `None` for a non-polarised port.
  pub fn port_pol(&self, port: &str) -> Option<&str> {
    let initial = port.chars().next()?.to_ascii_lowercase();
    self
      .polarizations
      .iter()
      .find(|pol| pol_initial(pol) == Some(initial))
      .map(String::as_str)
  }

  /// Ports on `part_type` carrying `pol`, including non-polarised ports.
  pub fn get_ports(&self, pol: &str, part_type: &str) -> Vec<String> {
    let Some(def) = self.part_type(part_type) else {
      return Vec::new();
    };
    let initial = pol_initial(pol);
    def
      .ports()
      .into_iter()
      .filter(|port| match self.port_pol(port) {
        Some(port_pol) => pol_initial(port_pol) == initial,
        None => true,
      })
      .map(str::to_owned)
      .collect()
  }

  /// `(pol, port)` pairs for every polarised port of `part_type`.
  pub fn polarized_ports(&self, part_type: &str) -> Vec<(String, String)> {
    let Some(def) = self.part_type(part_type) else {
      return Vec::new();
    };
    def
      .ports()
      .into_iter()
      .filter_map(|port| {
        self
          .port_pol(port)
          .map(|pol| (pol.to_owned(), port.to_owned()))
      })
      .collect()
  }

  /// First port of `part_type`, used as the starting port of unpolarised
  /// parts.
  pub fn first_port(&self, part_type: &str) -> Option<String> {
    self
      .part_type(part_type)
      .and_then(|def| def.ports().first().map(|p| (*p).to_owned()))
  }

  pub fn full_connection_path(&self) -> Vec<String> {
    self.part_types.iter().map(|pt| pt.name.clone()).collect()
  }

  pub fn complete_paths(&self) -> Cow<'_, [Vec<String>]> {
    if self.complete_paths.is_empty() {
      Cow::Owned(vec![self.full_connection_path()])
    } else {
      Cow::Borrowed(&self.complete_paths)
    }
  }

  /// The complete pattern `sequence` matches exactly, if any.
  pub fn matching_complete_path(&self, sequence: &[String]) -> Option<Vec<String>> {
    self
      .complete_paths()
      .iter()
      .find(|pattern| pattern.as_slice() == sequence)
      .cloned()
  }

  pub fn redirect_via(&self, part_type: &str) -> Option<Direction> {
    self.redirect_part_types.get(part_type).copied()
  }

  pub fn single_pol_labeled(&self, part_type: &str) -> bool {
    self.single_pol_labeled_parts.contains(part_type)
  }

  fn normalize(&mut self) {
    self.polarizations = self
      .polarizations
      .iter()
      .map(|p| canonical_port(p))
      .collect();
    for def in &mut self.part_types {
      def.up = def.up.iter().map(|p| canonical_port(p)).collect();
      def.down = def.down.iter().map(|p| canonical_port(p)).collect();
    }
  }
}

fn pol_initial(pol: &str) -> Option<char> {
  pol.chars().next().map(|c| c.to_ascii_lowercase())
}

// ─── Part roles ──────────────────────────────────────────────────────────────

/// How a part is resolved: walked directly, or via its substitutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartRole {
  Physical { hookup_type: String },
  Redirect { hookup_type: String, via: Direction },
}

impl PartRole {
  pub fn hookup_type(&self) -> &str {
    match self {
      Self::Physical { hookup_type } | Self::Redirect { hookup_type, .. } => {
        hookup_type
      }
    }
  }
}

// ─── Sysdef ──────────────────────────────────────────────────────────────────

/// The set of topologies the resolver works against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sysdef {
  /// Priority order used when no hookup type is requested. Empty means
  /// alphabetical.
  #[serde(default)]
  pub checking_order: Vec<String>,
  #[serde(default)]
  pub topologies:     BTreeMap<String, Topology>,
}

impl Sysdef {
  /// Normalise port names and check internal references.
  pub fn validate(mut self) -> Result<Self> {
    self.ensure_configured()?;
    for name in &self.checking_order {
      if !self.topologies.contains_key(name) {
        return Err(Error::UnknownHookupType(name.clone()));
      }
    }
    for topology in self.topologies.values_mut() {
      topology.normalize();
    }
    Ok(self)
  }

  pub fn ensure_configured(&self) -> Result<()> {
    if self.topologies.is_empty() {
      return Err(Error::NoTopology);
    }
    Ok(())
  }

  pub fn topology(&self, hookup_type: &str) -> Result<&Topology> {
    self
      .topologies
      .get(hookup_type)
      .ok_or_else(|| Error::UnknownHookupType(hookup_type.to_owned()))
  }

  fn checking_order(&self) -> Vec<&str> {
    if self.checking_order.is_empty() {
      self.topologies.keys().map(String::as_str).collect()
    } else {
      self.checking_order.iter().map(String::as_str).collect()
    }
  }

  /// Resolve which topology governs `part_type`. A known hint always wins.
  pub fn find_hookup_type<'a>(
    &'a self,
    part_type: &str,
    hint: Option<&'a str>,
  ) -> Result<Option<&'a str>> {
    self.ensure_configured()?;
    if let Some(hint) = hint {
      self.topology(hint)?;
      return Ok(Some(hint));
    }
    Ok(
      self
        .checking_order()
        .into_iter()
        .find(|name| {
          self
            .topologies
            .get(*name)
            .is_some_and(|t| t.defines(part_type))
        }),
    )
  }

  pub fn classify(&self, part: &Part, hint: Option<&str>) -> Result<PartRole> {
    let unknown = || Error::UnknownPartType {
      part:      part.key().to_string(),
      part_type: part.hptype.clone(),
    };
    let hookup_type = self
      .find_hookup_type(&part.hptype, hint)?
      .ok_or_else(unknown)?;
    let topology = self.topology(hookup_type)?;
    if !topology.defines(&part.hptype) {
      return Err(unknown());
    }
    Ok(match topology.redirect_via(&part.hptype) {
      Some(via) => PartRole::Redirect {
        hookup_type: hookup_type.to_owned(),
        via,
      },
      None => PartRole::Physical {
        hookup_type: hookup_type.to_owned(),
      },
    })
  }

  pub fn get_ports(
    &self,
    hookup_type: &str,
    pol: &str,
    part_type: &str,
  ) -> Result<Vec<String>> {
    Ok(self.topology(hookup_type)?.get_ports(pol, part_type))
  }

  /// Substitute parts for a redirect part: everything attached to it on the
  /// redirect side, sorted by key.
  pub fn handle_redirect_part_types(
    &self,
    role: &PartRole,
    key: &PartKey,
    active: &ActiveSet,
  ) -> Vec<PartKey> {
    match role {
      PartRole::Physical { .. } => Vec::new(),
      PartRole::Redirect { via, .. } => active.neighbors(key, *via),
    }
  }

  /// The topologies used by the HERA array.
  pub fn hera_default() -> Self {
    let hera = Topology {
      polarizations:            pols(),
      part_types:               vec![
        PartTypeDef::new("station", &[], &["ground"]),
        PartTypeDef::new("antenna", &["ground"], &["focus"]),
        PartTypeDef::new("feed", &["input"], &["terminals"]),
        PartTypeDef::new("front-end", &["input"], &["e", "n"]),
        PartTypeDef::new("cable-rfof", &["e", "n"], &["e", "n"]),
        PartTypeDef::new("post-amp", &["e", "n"], &["e", "n"]),
        PartTypeDef::new(
          "snap",
          &["e2", "n0", "e6", "n4", "e10", "n8"],
          &["rack"],
        ),
        PartTypeDef::new("node", &["loc0", "loc1", "loc2", "loc3"], &[]),
      ],
      redirect_part_types:      BTreeMap::from([(
        "node".to_owned(),
        Direction::Up,
      )]),
      single_pol_labeled_parts: BTreeSet::new(),
      complete_paths:           Vec::new(),
    };

    let paper = Topology {
      polarizations:            pols(),
      part_types:               vec![
        PartTypeDef::new("station", &[], &["ground"]),
        PartTypeDef::new("antenna", &["ground"], &["focus"]),
        PartTypeDef::new("feed", &["input"], &["terminals"]),
        PartTypeDef::new("front-end", &["input"], &["e", "n"]),
        PartTypeDef::new("cable-feed75", &["e", "n"], &["ea", "na"]),
        PartTypeDef::new("cable-post-amp(in)", &["a"], &["b"]),
        PartTypeDef::new("post-amp", &["ea", "na"], &["eb", "nb"]),
        PartTypeDef::new("cable-post-amp(out)", &["a"], &["b"]),
        PartTypeDef::new("cable-receiverator", &["a"], &["b"]),
        PartTypeDef::new("cable-container", &["ea", "na"], &["eb", "nb"]),
        PartTypeDef::new("f-engine", &["input"], &[]),
      ],
      redirect_part_types:      BTreeMap::new(),
      single_pol_labeled_parts: [
        "cable-post-amp(in)",
        "cable-post-amp(out)",
        "cable-receiverator",
      ]
      .into_iter()
      .map(str::to_owned)
      .collect(),
      complete_paths:           Vec::new(),
    };

    let rfi = Topology {
      polarizations:            pols(),
      part_types:               vec![
        PartTypeDef::new("station", &[], &["ground"]),
        PartTypeDef::new("antenna", &["ground"], &["focus"]),
        PartTypeDef::new("feed", &["input"], &["terminals"]),
        PartTypeDef::new("temp-cable", &["ea", "na"], &["e", "n"]),
        PartTypeDef::new("snap", &["e2", "n0"], &["rack"]),
        PartTypeDef::new("node", &["loc1"], &[]),
      ],
      redirect_part_types:      BTreeMap::new(),
      single_pol_labeled_parts: BTreeSet::new(),
      complete_paths:           Vec::new(),
    };

    let test = Topology {
      polarizations:            pols(),
      part_types:               vec![PartTypeDef::new("vapor", &[], &[])],
      redirect_part_types:      BTreeMap::new(),
      single_pol_labeled_parts: BTreeSet::new(),
      complete_paths:           Vec::new(),
    };

    Self {
      checking_order: ["parts_hera", "parts_paper", "parts_rfi", "parts_test"]
        .into_iter()
        .map(str::to_owned)
        .collect(),
      topologies:     BTreeMap::from([
        ("parts_hera".to_owned(), hera),
        ("parts_paper".to_owned(), paper),
        ("parts_rfi".to_owned(), rfi),
        ("parts_test".to_owned(), test),
      ]),
    }
  }
}

fn pols() -> Vec<String> { vec!["e".to_owned(), "n".to_owned()] }
