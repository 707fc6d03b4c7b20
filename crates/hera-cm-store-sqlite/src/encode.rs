//! Encoding and decoding helpers between domain types and SQLite rows.
//!
//! GPS times are stored as plain integers. Names are stored in canonical
//! form (HPNs and revisions upper-case, ports lower-case) so key lookups are
//! exact string comparisons.

use hera_cm_core::{
  part::{AprioriStatus, CmVersion, Connection, GeoLocation, Part, PartInfo},
  time::GpsTime,
};
use rusqlite::Row;

// ─── GpsTime ─────────────────────────────────────────────────────────────────

pub fn encode_gps(t: GpsTime) -> i64 { t.seconds() }

pub fn encode_opt_gps(t: Option<GpsTime>) -> Option<i64> { t.map(encode_gps) }

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub const PART_COLUMNS: &str =
  "hpn, hpn_rev, hptype, manufacturer_number, start_gpstime, stop_gpstime";

/// Raw values read directly from a `parts` row.
pub struct RawPart {
  pub hpn:                 String,
  pub hpn_rev:             String,
  pub hptype:              String,
  pub manufacturer_number: Option<String>,
  pub start_gpstime:       i64,
  pub stop_gpstime:        Option<i64>,
}

impl RawPart {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      hpn:                 row.get(0)?,
      hpn_rev:             row.get(1)?,
      hptype:              row.get(2)?,
      manufacturer_number: row.get(3)?,
      start_gpstime:       row.get(4)?,
      stop_gpstime:        row.get(5)?,
    })
  }

  pub fn into_part(self) -> Part {
    Part {
      hpn:                 self.hpn,
      hpn_rev:             self.hpn_rev,
      hptype:              self.hptype,
      manufacturer_number: self.manufacturer_number,
      start_gpstime:       GpsTime(self.start_gpstime),
      stop_gpstime:        self.stop_gpstime.map(GpsTime),
    }
  }
}

pub const CONNECTION_COLUMNS: &str = "upstream_part, up_part_rev, upstream_output_port, \
                                      downstream_part, down_part_rev, \
                                      downstream_input_port, start_gpstime, stop_gpstime";

/// Raw values read directly from a `connections` row.
pub struct RawConnection {
  pub upstream_part:         String,
  pub up_part_rev:           String,
  pub upstream_output_port:  String,
  pub downstream_part:       String,
  pub down_part_rev:         String,
  pub downstream_input_port: String,
  pub start_gpstime:         i64,
  pub stop_gpstime:          Option<i64>,
}

impl RawConnection {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      upstream_part:         row.get(0)?,
      up_part_rev:           row.get(1)?,
      upstream_output_port:  row.get(2)?,
      downstream_part:       row.get(3)?,
      down_part_rev:         row.get(4)?,
      downstream_input_port: row.get(5)?,
      start_gpstime:         row.get(6)?,
      stop_gpstime:          row.get(7)?,
    })
  }

  pub fn into_connection(self) -> Connection {
    Connection {
      upstream_part:         self.upstream_part,
      up_part_rev:           self.up_part_rev,
      upstream_output_port:  self.upstream_output_port,
      downstream_part:       self.downstream_part,
      down_part_rev:         self.down_part_rev,
      downstream_input_port: self.downstream_input_port,
      start_gpstime:         GpsTime(self.start_gpstime),
      stop_gpstime:          self.stop_gpstime.map(GpsTime),
    }
  }
}

pub const PART_INFO_COLUMNS: &str = "hpn, hpn_rev, comment, posting_gpstime, reference";

pub fn read_part_info(row: &Row<'_>) -> rusqlite::Result<PartInfo> {
  Ok(PartInfo {
    hpn:             row.get(0)?,
    hpn_rev:         row.get(1)?,
    comment:         row.get(2)?,
    posting_gpstime: GpsTime(row.get(3)?),
    reference:       row.get(4)?,
  })
}

pub const APRIORI_COLUMNS: &str = "antenna, status, start_gpstime, stop_gpstime";

pub fn read_apriori(row: &Row<'_>) -> rusqlite::Result<AprioriStatus> {
  Ok(AprioriStatus {
    antenna:       row.get(0)?,
    status:        row.get(1)?,
    start_gpstime: GpsTime(row.get(2)?),
    stop_gpstime:  row.get::<_, Option<i64>>(3)?.map(GpsTime),
  })
}

pub const GEO_COLUMNS: &str = "station_name, station_type, datum, tile, northing, \
                               easting, elevation, created_gpstime";

pub fn read_geo(row: &Row<'_>) -> rusqlite::Result<GeoLocation> {
  Ok(GeoLocation {
    station_name:    row.get(0)?,
    station_type:    row.get(1)?,
    datum:           row.get(2)?,
    tile:            row.get(3)?,
    northing:        row.get(4)?,
    easting:         row.get(5)?,
    elevation:       row.get(6)?,
    created_gpstime: GpsTime(row.get(7)?),
  })
}

pub fn read_version(row: &Row<'_>) -> rusqlite::Result<CmVersion> {
  Ok(CmVersion {
    update_time: GpsTime(row.get(0)?),
    git_hash:    row.get(1)?,
  })
}
