//! Core types and hookup resolution for the HERA configuration-management
//! store.
//!
//! This crate is free of database dependencies. Storage backends implement
//! [`store::CmStore`]; everything else (active sets, topologies, the
//! resolver, the cache) works against that trait.

pub mod active;
pub mod cache;
pub mod entry;
pub mod error;
pub mod health;
pub mod hookup;
pub mod part;
pub mod service;
pub mod store;
pub mod sysdef;
pub mod time;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use hookup::{HookupDossier, PolSelection};
pub use service::{CacheSettings, HookupRequest, HookupService, Resolved};
