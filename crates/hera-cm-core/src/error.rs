//! Error types for `hera-cm-core`.

use thiserror::Error;

use crate::sysdef::Direction;

#[derive(Debug, Error)]
pub enum Error {
  /// Two active connections claim the same port of the same part.
  #[error(
    "duplicate active connection on {side} port {port:?} of {part}: {existing} and {duplicate}"
  )]
  DuplicateConnection {
    part:      String,
    port:      String,
    side:      Direction,
    existing:  String,
    duplicate: String,
  },

  #[error("no system topology configured")]
  NoTopology,

  #[error("unknown hookup type: {0:?}")]
  UnknownHookupType(String),

  #[error("part type {part_type:?} of {part} is not defined in any topology")]
  UnknownPartType { part: String, part_type: String },

  #[error("part not active: {0}")]
  PartNotFound(String),

  #[error("ambiguous {pol} port at {part} walking {direction}: {candidates:?}")]
  AmbiguousPort {
    part:       String,
    pol:        String,
    direction:  Direction,
    candidates: Vec<String>,
  },

  #[error("cycle detected in signal path at {part} port {port:?} walking {direction}")]
  TopologyCycle {
    part:      String,
    port:      String,
    direction: Direction,
  },

  #[error("redirect chain too deep at {0}")]
  RedirectDepth(String),

  #[error("cache format error: {0}")]
  CacheFormat(String),

  #[error("invalid time {0:?}")]
  InvalidTime(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Failures that only void the result for one part of a batch.
  pub fn is_per_part(&self) -> bool {
    matches!(
      self,
      Self::UnknownPartType { .. } | Self::PartNotFound(_) | Self::RedirectDepth(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
