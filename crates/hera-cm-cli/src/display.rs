//! Plain-text rendering of hookup dossiers.

use std::fmt::Write as _;

use hera_cm_core::{
  HookupDossier,
  active::ActiveSet,
  entry::HookupEntry,
  part::{Connection, PartKey},
};
use tabled::{builder::Builder, settings::Style};

/// One table per resolved part, one row per hookup key.
///
/// `active` supplies the apriori status, surveyed location and notes of each
/// part; it is absent when the dossier came from the cache.
pub fn render_dossier(dossier: &HookupDossier, active: Option<&ActiveSet>) -> String {
  let mut out = String::new();
  if dossier.is_empty() {
    out.push_str("no hookups found\n");
    return out;
  }
  for (key, entry) in dossier {
    let (hpn, rev) = key.rsplit_once(':').unwrap_or((key.as_str(), ""));
    let status = active
      .and_then(|a| a.apriori(hpn))
      .map(|s| format!(" [{}]", s.status))
      .unwrap_or_default();
    let _ = writeln!(out, "{key}{status}");
    if let Some(active) = active {
      out.push_str(&render_context(active, &PartKey::new(hpn, rev)));
    }
    out.push_str(&render_entry(entry));
    out.push('\n');
  }
  out
}

/// Location and notes for one part, one line each.
fn render_context(active: &ActiveSet, key: &PartKey) -> String {
  let mut out = String::new();
  if let Some(geo) = active.geo(key.hpn()) {
    let _ = writeln!(
      out,
      "  location: {:.1} E  {:.1} N  {:.1} m ({} {})",
      geo.easting, geo.northing, geo.elevation, geo.datum, geo.tile
    );
  }
  for note in active.info(key) {
    let _ = write!(out, "  note @{}: {}", note.posting_gpstime, note.comment);
    if let Some(reference) = &note.reference {
      let _ = write!(out, " <{reference}>");
    }
    out.push('\n');
  }
  out
}

fn render_entry(entry: &HookupEntry) -> String {
  let mut header = vec!["key".to_owned()];
  header.extend(entry.column_headers().iter().cloned());
  header.push("complete".to_owned());
  let width = header.len();

  let mut builder = Builder::default();
  builder.push_record(header);
  for key in entry.keys() {
    let chain = entry.hookup.get(key).map(Vec::as_slice).unwrap_or_default();
    let mut row = vec![key.to_owned()];
    row.extend(chain_cells(chain));
    row.resize(width - 1, String::new());
    row.push(if entry.is_fully_connected(key) { "yes" } else { "no" }.to_owned());
    builder.push_record(row);
  }

  let table = builder.build().with(Style::blank()).to_string();
  let mut out = String::new();
  for line in table.lines() {
    let _ = writeln!(out, " {}", line.trim_end());
  }
  out
}

/// One cell per part along the chain: `in> HPN:REV <out`.
fn chain_cells(chain: &[Connection]) -> Vec<String> {
  let Some(first) = chain.first() else {
    return Vec::new();
  };
  let mut cells = vec![format!(
    "{}:{} <{}",
    first.upstream_part, first.up_part_rev, first.upstream_output_port
  )];
  for (i, c) in chain.iter().enumerate() {
    let mut cell = format!(
      "{}> {}:{}",
      c.downstream_input_port, c.downstream_part, c.down_part_rev
    );
    if let Some(next) = chain.get(i + 1) {
      let _ = write!(cell, " <{}", next.upstream_output_port);
    }
    cells.push(cell);
  }
  cells
}
