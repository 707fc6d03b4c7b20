//! The `CmStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `hera-cm-store-sqlite`).
//! The hookup machinery only ever reads through it; the write methods exist
//! for the loading scripts and for tests.

use std::future::Future;

use crate::{
  part::{AprioriStatus, CmVersion, Connection, GeoLocation, Part, PartInfo, PartKey},
  time::GpsTime,
};

/// Abstraction over a temporal part/connection store.
///
/// Rows are never deleted. Removing hardware is expressed by setting the stop
/// time of the part or connection record.
pub trait CmStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new part record. Fails if `(hpn, hpn_rev)` already exists.
  fn add_part(
    &self,
    part: Part,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Set the stop time of an existing part record.
  fn stop_part(
    &self,
    key: PartKey,
    at: GpsTime,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_connection(
    &self,
    connection: Connection,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Set the stop time of the connection identified by its full primary key
  /// (both ends, both ports and its start time).
  fn stop_connection(
    &self,
    connection: Connection,
    at: GpsTime,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_part_info(
    &self,
    info: PartInfo,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_apriori(
    &self,
    status: AprioriStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_geo(
    &self,
    location: GeoLocation,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append a modification-version record.
  fn record_version(
    &self,
    version: CmVersion,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Point-in-time reads ───────────────────────────────────────────────

  /// Parts with `start <= at` and (`stop` null or `stop > at`).
  fn active_parts(
    &self,
    at: GpsTime,
  ) -> impl Future<Output = Result<Vec<Part>, Self::Error>> + Send + '_;

  /// Connections with `start <= at` and (`stop` null or `stop > at`).
  fn active_connections(
    &self,
    at: GpsTime,
  ) -> impl Future<Output = Result<Vec<Connection>, Self::Error>> + Send + '_;

  /// Info notes posted at or before `at`.
  fn active_part_info(
    &self,
    at: GpsTime,
  ) -> impl Future<Output = Result<Vec<PartInfo>, Self::Error>> + Send + '_;

  fn active_apriori(
    &self,
    at: GpsTime,
  ) -> impl Future<Output = Result<Vec<AprioriStatus>, Self::Error>> + Send + '_;

  /// Stations created at or before `at`.
  fn active_geo(
    &self,
    at: GpsTime,
  ) -> impl Future<Output = Result<Vec<GeoLocation>, Self::Error>> + Send + '_;

  /// The most recent modification-version record, if any.
  fn latest_version(
    &self,
  ) -> impl Future<Output = Result<Option<CmVersion>, Self::Error>> + Send + '_;

  // ── Full history ──────────────────────────────────────────────────────

  fn list_parts(
    &self,
  ) -> impl Future<Output = Result<Vec<Part>, Self::Error>> + Send + '_;

  fn list_connections(
    &self,
  ) -> impl Future<Output = Result<Vec<Connection>, Self::Error>> + Send + '_;
}
