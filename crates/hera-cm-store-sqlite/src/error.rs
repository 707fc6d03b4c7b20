//! Error type for `hera-cm-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A part record with this `(hpn, hpn_rev)` already exists.
  #[error("part already exists: {0}")]
  DuplicatePart(String),

  /// Attempted to stop a part or connection that was not found.
  #[error("not found: {0}")]
  NotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
