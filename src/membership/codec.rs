//! Entity Codec
//!
//! Pure translation between membership records and flat store rows. Silo rows and the
//! cluster version row share one table, told apart by `entity_id` / `entity_type`.
//!
//! Suspicion evidence is stored as two parallel lists (`suspecting_silos`,
//! `suspecting_times`); [`row_to_entry`] refuses rows where their lengths differ.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

use super::error::MembershipError;
use super::types::{MembershipEntry, SiloAddress, SiloStatus, TableVersion};
use crate::storage::types::{ColumnDef, ColumnKind, Row, RowKey, TableSchema, Value};

/// Column names of the membership table.
pub mod columns {
    pub const CLUSTER_ID: &str = "cluster_id";
    pub const ENTITY_ID: &str = "entity_id";
    pub const ENTITY_TYPE: &str = "entity_type";
    pub const ADDRESS: &str = "address";
    pub const PORT: &str = "port";
    pub const GENERATION: &str = "generation";
    pub const SILO_NAME: &str = "silo_name";
    pub const HOST_NAME: &str = "host_name";
    pub const STATUS: &str = "status";
    pub const PROXY_PORT: &str = "proxy_port";
    pub const ROLE_NAME: &str = "role_name";
    pub const UPDATE_ZONE: &str = "update_zone";
    pub const FAULT_ZONE: &str = "fault_zone";
    pub const SUSPECTING_SILOS: &str = "suspecting_silos";
    pub const SUSPECTING_TIMES: &str = "suspecting_times";
    pub const START_TIME: &str = "start_time";
    pub const I_AM_ALIVE_TIME: &str = "i_am_alive_time";
    /// Version row only.
    pub const TIMESTAMP: &str = "timestamp";
    /// Version row only.
    pub const VERSION: &str = "version";
}

/// Reserved `entity_id` (and `entity_type`) of the cluster version row.
pub const CLUSTER_VERSION_ID: &str = "ClusterVersion";
/// `entity_type` of silo rows.
pub const SILO_INSTANCE_TYPE: &str = "SiloInstance";

pub fn membership_schema(table_name: &str) -> TableSchema {
    use columns::*;

    let column = ColumnDef::new;
    TableSchema {
        name: table_name.to_string(),
        columns: vec![
            column(CLUSTER_ID, ColumnKind::Text),
            column(ENTITY_ID, ColumnKind::Text),
            column(ENTITY_TYPE, ColumnKind::Text),
            column(ADDRESS, ColumnKind::Text),
            column(PORT, ColumnKind::Int),
            column(GENERATION, ColumnKind::Int),
            column(SILO_NAME, ColumnKind::Text),
            column(HOST_NAME, ColumnKind::Text),
            column(STATUS, ColumnKind::Int),
            column(PROXY_PORT, ColumnKind::Int),
            column(ROLE_NAME, ColumnKind::Text),
            column(UPDATE_ZONE, ColumnKind::Int),
            column(FAULT_ZONE, ColumnKind::Int),
            column(SUSPECTING_SILOS, ColumnKind::TextList),
            column(SUSPECTING_TIMES, ColumnKind::TimestampList),
            column(START_TIME, ColumnKind::Timestamp),
            column(I_AM_ALIVE_TIME, ColumnKind::Timestamp),
            column(TIMESTAMP, ColumnKind::Timestamp),
            column(VERSION, ColumnKind::Int),
        ],
        partition_key: vec![CLUSTER_ID.to_string(), ENTITY_ID.to_string()],
    }
}

pub fn row_key(cluster_id: &str, entity_id: &str) -> RowKey {
    RowKey::new([cluster_id, entity_id])
}

pub fn is_version_row(row: &Row) -> bool {
    matches!(row.get(columns::ENTITY_ID), Some(Value::Text(id)) if id == CLUSTER_VERSION_ID)
}

/// Flattens an entry into a full silo row. Every column is written, so the row
/// replaces whatever was stored before.
pub fn entry_to_row(entry: &MembershipEntry, cluster_id: &str) -> Row {
    use columns::*;

    let silo = &entry.silo_address;
    let (suspecting_silos, suspecting_times): (Vec<String>, Vec<DateTime<Utc>>) = entry
        .suspect_times
        .iter()
        .map(|(suspector, time)| (suspector.to_string(), *time))
        .unzip();

    Row::new()
        .with(CLUSTER_ID, cluster_id)
        .with(ENTITY_ID, silo.entity_id())
        .with(ENTITY_TYPE, SILO_INSTANCE_TYPE)
        .with(ADDRESS, silo.address().to_string())
        .with(PORT, i64::from(silo.port()))
        .with(GENERATION, i64::from(silo.generation))
        .with(SILO_NAME, entry.silo_name.as_str())
        .with(HOST_NAME, entry.host_name.as_str())
        .with(STATUS, entry.status.code())
        .with(
            PROXY_PORT,
            entry
                .proxy_port
                .map(|port| Value::Int(i64::from(port)))
                .unwrap_or(Value::Null),
        )
        .with(ROLE_NAME, entry.role_name.as_str())
        .with(UPDATE_ZONE, i64::from(entry.update_zone))
        .with(FAULT_ZONE, i64::from(entry.fault_zone))
        .with(SUSPECTING_SILOS, Value::TextList(suspecting_silos))
        .with(SUSPECTING_TIMES, Value::TimestampList(suspecting_times))
        .with(START_TIME, entry.start_time)
        .with(I_AM_ALIVE_TIME, entry.i_am_alive_time)
}

/// Rebuilds an entry from a silo row.
///
/// The stored `entity_id` is informational; identity comes from address, port and
/// generation.
pub fn row_to_entry(row: &Row) -> Result<MembershipEntry, MembershipError> {
    use columns::*;

    let reader = RowReader::new(row);

    let address: IpAddr = reader
        .text(ADDRESS)?
        .parse()
        .map_err(|_| reader.malformed(ADDRESS, "not an IP address"))?;
    let port = reader.narrow::<u16>(PORT)?;
    let generation = reader.narrow::<i32>(GENERATION)?;
    let silo_address = SiloAddress::from_parts(address, port, generation);

    let status_code = reader.int(STATUS)?;
    let status = SiloStatus::from_code(status_code)
        .ok_or_else(|| reader.malformed(STATUS, &format!("unknown status {}", status_code)))?;

    let proxy_port = match reader.optional_int(PROXY_PORT)? {
        Some(port) => Some(
            u16::try_from(port).map_err(|_| reader.malformed(PROXY_PORT, "out of range"))?,
        ),
        None => None,
    };

    let suspecting_silos = reader.text_list(SUSPECTING_SILOS)?;
    let suspecting_times = reader.timestamp_list(SUSPECTING_TIMES)?;
    if suspecting_silos.len() != suspecting_times.len() {
        return Err(MembershipError::Inconsistent {
            entity_id: reader.entity_id(),
            silos: suspecting_silos.len(),
            times: suspecting_times.len(),
        });
    }

    let mut entry = MembershipEntry {
        silo_address,
        status,
        proxy_port,
        silo_name: reader.optional_text(SILO_NAME)?.unwrap_or_default(),
        host_name: reader.optional_text(HOST_NAME)?.unwrap_or_default(),
        role_name: reader.optional_text(ROLE_NAME)?.unwrap_or_default(),
        update_zone: reader.narrow_or_zero::<i32>(UPDATE_ZONE)?,
        fault_zone: reader.narrow_or_zero::<i32>(FAULT_ZONE)?,
        suspect_times: Vec::with_capacity(suspecting_silos.len()),
        start_time: reader.timestamp(START_TIME)?,
        i_am_alive_time: reader.timestamp(I_AM_ALIVE_TIME)?,
    };

    for (silo, time) in suspecting_silos.iter().zip(suspecting_times) {
        let suspector: SiloAddress = silo.parse().map_err(|_| {
            reader.malformed(SUSPECTING_SILOS, &format!("bad silo address '{}'", silo))
        })?;
        entry.add_suspector(suspector, time);
    }

    Ok(entry)
}

/// Full version row stamped with `timestamp`.
pub fn version_to_row(version: &TableVersion, cluster_id: &str, timestamp: DateTime<Utc>) -> Row {
    use columns::*;

    Row::new()
        .with(CLUSTER_ID, cluster_id)
        .with(ENTITY_ID, CLUSTER_VERSION_ID)
        .with(ENTITY_TYPE, CLUSTER_VERSION_ID)
        .with(VERSION, version.version)
        .with(TIMESTAMP, timestamp)
}

pub fn row_to_version(row: &Row) -> Result<TableVersion, MembershipError> {
    let reader = RowReader::new(row);
    Ok(TableVersion::new(reader.int(columns::VERSION)?))
}

/// Typed column access with errors naming the row and column.
struct RowReader<'a> {
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    fn new(row: &'a Row) -> Self {
        Self { row }
    }

    fn entity_id(&self) -> String {
        match self.row.get(columns::ENTITY_ID) {
            Some(Value::Text(id)) => id.clone(),
            _ => "<unknown>".to_string(),
        }
    }

    fn malformed(&self, column: &str, reason: &str) -> MembershipError {
        MembershipError::MalformedRow {
            entity_id: self.entity_id(),
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    fn optional_text(&self, column: &str) -> Result<Option<String>, MembershipError> {
        match self.row.get(column) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(self.malformed(column, "expected text")),
        }
    }

    fn text(&self, column: &str) -> Result<String, MembershipError> {
        self.optional_text(column)?
            .ok_or_else(|| self.malformed(column, "missing"))
    }

    fn optional_int(&self, column: &str) -> Result<Option<i64>, MembershipError> {
        match self.row.get(column) {
            None => Ok(None),
            Some(Value::Int(value)) => Ok(Some(*value)),
            Some(_) => Err(self.malformed(column, "expected integer")),
        }
    }

    fn int(&self, column: &str) -> Result<i64, MembershipError> {
        self.optional_int(column)?
            .ok_or_else(|| self.malformed(column, "missing"))
    }

    fn narrow<T: TryFrom<i64>>(&self, column: &str) -> Result<T, MembershipError> {
        T::try_from(self.int(column)?).map_err(|_| self.malformed(column, "out of range"))
    }

    fn narrow_or_zero<T: TryFrom<i64> + Default>(
        &self,
        column: &str,
    ) -> Result<T, MembershipError> {
        match self.optional_int(column)? {
            Some(value) => T::try_from(value).map_err(|_| self.malformed(column, "out of range")),
            None => Ok(T::default()),
        }
    }

    fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, MembershipError> {
        match self.row.get(column) {
            Some(Value::Timestamp(time)) => Ok(*time),
            Some(_) => Err(self.malformed(column, "expected timestamp")),
            None => Err(self.malformed(column, "missing")),
        }
    }

    // An empty list is indistinguishable from an unset column.
    fn text_list(&self, column: &str) -> Result<Vec<String>, MembershipError> {
        match self.row.get(column) {
            None => Ok(Vec::new()),
            Some(Value::TextList(items)) => Ok(items.clone()),
            Some(_) => Err(self.malformed(column, "expected text list")),
        }
    }

    fn timestamp_list(&self, column: &str) -> Result<Vec<DateTime<Utc>>, MembershipError> {
        match self.row.get(column) {
            None => Ok(Vec::new()),
            Some(Value::TimestampList(items)) => Ok(items.clone()),
            Some(_) => Err(self.malformed(column, "expected timestamp list")),
        }
    }
}
