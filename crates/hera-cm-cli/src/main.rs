//! `hera-cm`: hookup queries and cache maintenance for the CM store.
//!
//! # Usage
//!
//! ```
//! hera-cm hookup HH23 --pol e --date 2024-03-01
//! hera-cm --config /etc/hera-cm.toml cache write --message "after rewiring"
//! hera-cm check
//! ```

mod config;
mod display;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hera_cm_core::{
  HookupRequest, HookupService, PolSelection,
  part::CmVersion,
  service::CacheStatus,
  store::CmStore,
  time::GpsTime,
};
use hera_cm_store_sqlite::SqliteStore;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hera-cm", version, about = "HERA configuration-management hookup tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "hera-cm.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve signal chains for parts matching NAMES.
  Hookup(HookupArgs),

  /// Build or inspect the hookup cache.
  #[command(subcommand)]
  Cache(CacheCommand),

  /// Report overlapping part and connection records.
  Check,

  /// Record that the store was modified now.
  Version {
    #[arg(long)]
    git_hash: Option<String>,
  },
}

#[derive(clap::Args, Debug)]
struct HookupArgs {
  /// HPNs or HPN prefixes.
  #[arg(required = true)]
  names: Vec<String>,

  /// `e`, `n` or `all`.
  #[arg(long, default_value = "all")]
  pol: PolSelection,

  /// `now`, GPS seconds, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
  #[arg(long, default_value = "now")]
  date: GpsTime,

  /// Match names exactly instead of as prefixes.
  #[arg(long)]
  exact: bool,

  #[arg(long)]
  hookup_type: Option<String>,

  #[arg(long)]
  use_cache: bool,

  /// Fail on ambiguous ports instead of ending the chain.
  #[arg(long)]
  strict: bool,

  /// Print the dossier as JSON.
  #[arg(long)]
  json: bool,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Rebuild the cache for the configured station list.
  Write {
    #[arg(long, default_value = "manual rebuild")]
    message: String,
  },
  /// Show what the cache holds and whether it is current.
  Status,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let service = HookupService::new(store, cfg.sysdef()?, cfg.cache_settings());

  match cli.command {
    Command::Hookup(args) => hookup(&service, args).await,
    Command::Cache(CacheCommand::Write { message }) => {
      let record = service
        .write_cache(&message)
        .await
        .context("failed to rebuild hookup cache")?;
      println!(
        "wrote {} entries at GPS {}{} to {}",
        record.entries,
        record.at_date_gps,
        utc_label(record.at_date_gps),
        cfg.cache_path.display()
      );
      Ok(())
    }
    Command::Cache(CacheCommand::Status) => cache_status(&service).await,
    Command::Check => check(&service).await,
    Command::Version { git_hash } => {
      let version = CmVersion {
        update_time: GpsTime::now(),
        git_hash,
      };
      info!(at = %version.update_time, "recording store version");
      service
        .store()
        .record_version(version)
        .await
        .context("failed to record version")?;
      Ok(())
    }
  }
}

async fn hookup(service: &HookupService<SqliteStore>, args: HookupArgs) -> anyhow::Result<()> {
  let request = HookupRequest {
    names:        args.names,
    pol:          args.pol,
    at:           args.date,
    exact_match:  args.exact,
    hookup_type:  args.hookup_type,
    use_cache:    args.use_cache,
    strict_ports: args.strict,
  };
  let resolved = service
    .resolve(&request, None)
    .await
    .context("hookup resolution failed")?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&resolved.dossier)?);
  } else {
    let active = resolved.context.as_ref().map(|c| c.active());
    print!("{}", display::render_dossier(&resolved.dossier, active));
  }
  Ok(())
}

async fn cache_status(service: &HookupService<SqliteStore>) -> anyhow::Result<()> {
  let path = service.cache_settings().path.display().to_string();
  match service.cache_status(GpsTime::now()).await? {
    CacheStatus::Missing => println!("{path}: no cache file"),
    CacheStatus::Unreadable { reason } => println!("{path}: unreadable ({reason})"),
    CacheStatus::Loaded {
      at_date_gps,
      hookup_type,
      hookup_list,
      entries,
      stale,
    } => {
      println!(
        "{path}: {entries} entries built at GPS {at_date_gps}{}",
        utc_label(at_date_gps)
      );
      println!("  stations:    {}", hookup_list.join(", "));
      println!("  hookup type: {}", hookup_type.as_deref().unwrap_or("any"));
      match stale {
        Some(reason) => println!("  stale:       {reason}"),
        None => println!("  current"),
      }
    }
  }
  Ok(())
}

async fn check(service: &HookupService<SqliteStore>) -> anyhow::Result<()> {
  let report = service.check().await.context("store check failed")?;
  for overlap in &report.parts {
    println!(
      "part {} overlaps: rev {} from {} and rev {} from {}",
      overlap.hpn,
      overlap.first.hpn_rev,
      overlap.first.start_gpstime,
      overlap.second.hpn_rev,
      overlap.second.start_gpstime,
    );
  }
  for overlap in &report.connections {
    println!(
      "{} port {:?} ({} side) held by {} and {}",
      overlap.part, overlap.port, overlap.side, overlap.first, overlap.second,
    );
  }
  if !report.is_clean() {
    anyhow::bail!(
      "{} part and {} port overlaps found",
      report.parts.len(),
      report.connections.len()
    );
  }
  println!("no overlaps found");
  Ok(())
}

/// ` (<UTC time>)`, or nothing for a time outside chrono's range.
fn utc_label(t: GpsTime) -> String {
  t.to_datetime()
    .map(|dt| format!(" ({})", dt.format("%Y-%m-%d %H:%M:%S UTC")))
    .unwrap_or_default()
}
