//! The SQLite implementation of [`CmStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, Row};
use tracing::debug;

use hera_cm_core::{
  part::{
    AprioriStatus, CmVersion, Connection, GeoLocation, Part, PartInfo, PartKey,
    canonical_name,
  },
  store::CmStore,
  time::GpsTime,
};

use crate::{
  Error, Result,
  encode::{
    APRIORI_COLUMNS, CONNECTION_COLUMNS, GEO_COLUMNS, PART_COLUMNS, PART_INFO_COLUMNS,
    RawConnection, RawPart, encode_gps, encode_opt_gps, read_apriori, read_geo,
    read_part_info, read_version,
  },
  schema::SCHEMA,
};

/// `start <= ?1` and (`stop` open or `stop > ?1`).
const ACTIVE_AT: &str =
  "start_gpstime <= ?1 AND (stop_gpstime IS NULL OR stop_gpstime > ?1)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A CM store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `sql` with `at` (if any) bound to `?1` and decode each row.
  async fn select<T>(
    &self,
    sql: String,
    at: Option<i64>,
    read: fn(&Row<'_>) -> rusqlite::Result<T>,
  ) -> Result<Vec<T>>
  where
    T: Send + 'static,
  {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = match at {
          Some(at) => stmt
            .query_map(rusqlite::params![at], read)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map([], read)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}

// ─── CmStore impl ────────────────────────────────────────────────────────────

impl CmStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn add_part(&self, part: Part) -> Result<()> {
    let part = part.canonicalize();
    let key = part.key();

    let inserted = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM parts WHERE hpn = ?1 AND hpn_rev = ?2",
            rusqlite::params![part.hpn, part.hpn_rev],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO parts (hpn, hpn_rev, hptype, manufacturer_number,
                              start_gpstime, stop_gpstime)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            part.hpn,
            part.hpn_rev,
            part.hptype,
            part.manufacturer_number,
            encode_gps(part.start_gpstime),
            encode_opt_gps(part.stop_gpstime),
          ],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicatePart(key.to_string()));
    }
    debug!(part = %key, "added part");
    Ok(())
  }

  async fn stop_part(&self, key: PartKey, at: GpsTime) -> Result<()> {
    let (hpn, rev) = key.split();
    let (hpn, rev) = (canonical_name(hpn), canonical_name(rev));
    let at = encode_gps(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE parts SET stop_gpstime = ?3 WHERE hpn = ?1 AND hpn_rev = ?2",
          rusqlite::params![hpn, rev, at],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound(key.to_string()));
    }
    Ok(())
  }

  async fn add_connection(&self, connection: Connection) -> Result<()> {
    let c = connection.canonicalize();
    debug!(connection = %c, "adding connection");

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO connections (
             upstream_part, up_part_rev, upstream_output_port,
             downstream_part, down_part_rev, downstream_input_port,
             start_gpstime, stop_gpstime
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            c.upstream_part,
            c.up_part_rev,
            c.upstream_output_port,
            c.downstream_part,
            c.down_part_rev,
            c.downstream_input_port,
            encode_gps(c.start_gpstime),
            encode_opt_gps(c.stop_gpstime),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn stop_connection(&self, connection: Connection, at: GpsTime) -> Result<()> {
    let c = connection.canonicalize();
    let label = c.to_string();
    let at = encode_gps(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE connections SET stop_gpstime = ?8
           WHERE upstream_part = ?1 AND up_part_rev = ?2
             AND upstream_output_port = ?3
             AND downstream_part = ?4 AND down_part_rev = ?5
             AND downstream_input_port = ?6
             AND start_gpstime = ?7",
          rusqlite::params![
            c.upstream_part,
            c.up_part_rev,
            c.upstream_output_port,
            c.downstream_part,
            c.down_part_rev,
            c.downstream_input_port,
            encode_gps(c.start_gpstime),
            at,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound(label));
    }
    Ok(())
  }

  async fn add_part_info(&self, info: PartInfo) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO part_info (hpn, hpn_rev, comment, posting_gpstime, reference)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            canonical_name(&info.hpn),
            canonical_name(&info.hpn_rev),
            info.comment,
            encode_gps(info.posting_gpstime),
            info.reference,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_apriori(&self, status: AprioriStatus) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO apriori_antenna (antenna, status, start_gpstime, stop_gpstime)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            canonical_name(&status.antenna),
            status.status,
            encode_gps(status.start_gpstime),
            encode_opt_gps(status.stop_gpstime),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_geo(&self, location: GeoLocation) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO geo_location (
             station_name, station_type, datum, tile,
             northing, easting, elevation, created_gpstime
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            canonical_name(&location.station_name),
            location.station_type,
            location.datum,
            location.tile,
            location.northing,
            location.easting,
            location.elevation,
            encode_gps(location.created_gpstime),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_version(&self, version: CmVersion) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO cm_version (update_time, git_hash) VALUES (?1, ?2)",
          rusqlite::params![encode_gps(version.update_time), version.git_hash],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Point-in-time reads ───────────────────────────────────────────────────

  async fn active_parts(&self, at: GpsTime) -> Result<Vec<Part>> {
    let sql = format!("SELECT {PART_COLUMNS} FROM parts WHERE {ACTIVE_AT}");
    let raws = self.select(sql, Some(encode_gps(at)), RawPart::from_row).await?;
    Ok(raws.into_iter().map(RawPart::into_part).collect())
  }

  async fn active_connections(&self, at: GpsTime) -> Result<Vec<Connection>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE {ACTIVE_AT}");
    let raws = self
      .select(sql, Some(encode_gps(at)), RawConnection::from_row)
      .await?;
    Ok(raws.into_iter().map(RawConnection::into_connection).collect())
  }

  async fn active_part_info(&self, at: GpsTime) -> Result<Vec<PartInfo>> {
    let sql = format!(
      "SELECT {PART_INFO_COLUMNS} FROM part_info WHERE posting_gpstime <= ?1
       ORDER BY posting_gpstime"
    );
    self.select(sql, Some(encode_gps(at)), read_part_info).await
  }

  async fn active_apriori(&self, at: GpsTime) -> Result<Vec<AprioriStatus>> {
    let sql = format!("SELECT {APRIORI_COLUMNS} FROM apriori_antenna WHERE {ACTIVE_AT}");
    self.select(sql, Some(encode_gps(at)), read_apriori).await
  }

  async fn active_geo(&self, at: GpsTime) -> Result<Vec<GeoLocation>> {
    let sql = format!("SELECT {GEO_COLUMNS} FROM geo_location WHERE created_gpstime <= ?1");
    self.select(sql, Some(encode_gps(at)), read_geo).await
  }

  async fn latest_version(&self) -> Result<Option<CmVersion>> {
    let version = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT update_time, git_hash FROM cm_version
               ORDER BY update_time DESC LIMIT 1",
              [],
              read_version,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(version)
  }

  // ── Full history ──────────────────────────────────────────────────────────

  async fn list_parts(&self) -> Result<Vec<Part>> {
    let sql = format!("SELECT {PART_COLUMNS} FROM parts ORDER BY hpn, hpn_rev");
    let raws = self.select(sql, None, RawPart::from_row).await?;
    Ok(raws.into_iter().map(RawPart::into_part).collect())
  }

  async fn list_connections(&self) -> Result<Vec<Connection>> {
    let sql = format!(
      "SELECT {CONNECTION_COLUMNS} FROM connections
       ORDER BY upstream_part, upstream_output_port, start_gpstime"
    );
    let raws = self.select(sql, None, RawConnection::from_row).await?;
    Ok(raws.into_iter().map(RawConnection::into_connection).collect())
  }
}
