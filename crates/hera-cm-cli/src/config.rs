//! Runtime configuration for the `hera-cm` binary.
//!
//! Layered from an optional TOML file and `HERA_CM_*` environment variables
//! on top of built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use hera_cm_core::{CacheSettings, sysdef::Sysdef};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  pub store_path:     PathBuf,
  /// TOML topology file; the built-in HERA topologies when unset.
  pub sysdef_path:    Option<PathBuf>,
  pub cache_path:     PathBuf,
  pub cache_log_path: PathBuf,
  /// Station prefixes resolved into the cache.
  pub hookup_list:    Vec<String>,
  pub hookup_type:    Option<String>,
}

impl Default for CliConfig {
  fn default() -> Self {
    let cache = CacheSettings::default();
    Self {
      store_path:     PathBuf::from("hera_cm.sqlite"),
      sysdef_path:    None,
      cache_path:     cache.path,
      cache_log_path: cache.audit_path,
      hookup_list:    cache.hookup_list,
      hookup_type:    cache.hookup_type,
    }
  }
}

impl CliConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(
        ::config::Environment::with_prefix("HERA_CM")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("hookup_list"),
      )
      .build()
      .context("failed to read config file")?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.cache_path = expand_tilde(&cfg.cache_path);
    cfg.cache_log_path = expand_tilde(&cfg.cache_log_path);
    cfg.sysdef_path = cfg.sysdef_path.as_deref().map(expand_tilde);
    Ok(cfg)
  }

  pub fn cache_settings(&self) -> CacheSettings {
    CacheSettings {
      path:        self.cache_path.clone(),
      audit_path:  self.cache_log_path.clone(),
      hookup_list: self.hookup_list.clone(),
      hookup_type: self.hookup_type.clone(),
    }
  }

  /// The configured topologies, validated.
  pub fn sysdef(&self) -> anyhow::Result<Sysdef> {
    let sysdef = match &self.sysdef_path {
      Some(path) => {
        let raw = std::fs::read_to_string(path)
          .with_context(|| format!("reading topology file {}", path.display()))?;
        toml::from_str::<Sysdef>(&raw)
          .with_context(|| format!("parsing topology file {}", path.display()))?
      }
      None => Sysdef::hera_default(),
    };
    sysdef.validate().context("invalid topology definition")
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.cache_path, PathBuf::from("hookup_cache.json"));
    assert_eq!(cfg.hookup_list, vec!["HH", "HA", "HB"]);
  }

  #[test]
  fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hera-cm.toml");
    std::fs::write(
      &path,
      "store_path = \"/data/cm.sqlite\"\nhookup_list = [\"HH\"]\nhookup_type = \"parts_hera\"\n",
    )
    .unwrap();

    let cfg = CliConfig::load(&path).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/data/cm.sqlite"));
    let cache = cfg.cache_settings();
    assert_eq!(cache.hookup_list, vec!["HH"]);
    assert_eq!(cache.hookup_type.as_deref(), Some("parts_hera"));
  }

  #[test]
  fn topology_file_is_parsed_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sysdef.toml");
    std::fs::write(
      &path,
      r#"
checking_order = ["parts_lab"]

[topologies.parts_lab]
polarizations = ["E", "N"]
redirect_part_types = { rack = "up" }

[[topologies.parts_lab.part_types]]
name = "source"
down = ["OUT"]

[[topologies.parts_lab.part_types]]
name = "rack"
up = ["slot1"]
"#,
    )
    .unwrap();

    let cfg = CliConfig {
      sysdef_path: Some(path),
      ..CliConfig::default()
    };
    let sysdef = cfg.sysdef().unwrap();
    let lab = sysdef.topology("parts_lab").unwrap();
    assert_eq!(lab.polarizations, vec!["e", "n"]);
    assert_eq!(lab.part_type("source").unwrap().down, vec!["out"]);
    assert!(lab.redirect_via("rack").is_some());
  }

  #[test]
  fn default_topologies_when_unset() {
    let sysdef = CliConfig::default().sysdef().unwrap();
    assert!(sysdef.topology("parts_hera").is_ok());
  }
}
