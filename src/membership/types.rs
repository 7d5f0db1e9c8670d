use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::error::MembershipError;

/// Network identity of one silo incarnation.
///
/// `generation` tells apart restarts that reuse the same endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiloAddress {
    pub endpoint: SocketAddr,
    pub generation: i32,
}

impl SiloAddress {
    pub fn new(endpoint: SocketAddr, generation: i32) -> Self {
        Self {
            endpoint,
            generation,
        }
    }

    pub fn from_parts(address: IpAddr, port: u16, generation: i32) -> Self {
        Self::new(SocketAddr::new(address, port), generation)
    }

    pub fn address(&self) -> IpAddr {
        self.endpoint.ip()
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// Row id of this silo in the membership table: `"{address}-{port}-{generation}"`.
    pub fn entity_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.endpoint.ip(),
            self.endpoint.port(),
            self.generation
        )
    }
}

/// Parsable form `"{endpoint}@{generation}"`, e.g. `10.0.0.1:11111@42` or `[::1]:11111@42`.
impl fmt::Display for SiloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.endpoint, self.generation)
    }
}

impl FromStr for SiloAddress {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, generation) = s
            .rsplit_once('@')
            .ok_or_else(|| MembershipError::InvalidSiloAddress(s.to_string()))?;
        let endpoint: SocketAddr = endpoint
            .parse()
            .map_err(|_| MembershipError::InvalidSiloAddress(s.to_string()))?;
        let generation: i32 = generation
            .parse()
            .map_err(|_| MembershipError::InvalidSiloAddress(s.to_string()))?;
        Ok(Self::new(endpoint, generation))
    }
}

/// Lifecycle state of a silo as persisted in the table.
///
/// The owning runtime drives the transitions
/// (`joining -> active -> {suspect -> dead} | shutting-down -> dead`);
/// the table stores whatever it is given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SiloStatus {
    Created,
    Joining,
    Active,
    ShuttingDown,
    Stopping,
    Dead,
    Suspect,
}

impl SiloStatus {
    /// Integer stored in the `status` column.
    pub fn code(self) -> i64 {
        match self {
            SiloStatus::Created => 1,
            SiloStatus::Joining => 2,
            SiloStatus::Active => 3,
            SiloStatus::ShuttingDown => 4,
            SiloStatus::Stopping => 5,
            SiloStatus::Dead => 6,
            SiloStatus::Suspect => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SiloStatus::Created),
            2 => Some(SiloStatus::Joining),
            3 => Some(SiloStatus::Active),
            4 => Some(SiloStatus::ShuttingDown),
            5 => Some(SiloStatus::Stopping),
            6 => Some(SiloStatus::Dead),
            7 => Some(SiloStatus::Suspect),
            _ => None,
        }
    }

    pub fn is_terminating(self) -> bool {
        matches!(
            self,
            SiloStatus::ShuttingDown | SiloStatus::Stopping | SiloStatus::Dead
        )
    }
}

impl fmt::Display for SiloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SiloStatus::Created => "created",
            SiloStatus::Joining => "joining",
            SiloStatus::Active => "active",
            SiloStatus::ShuttingDown => "shutting-down",
            SiloStatus::Stopping => "stopping",
            SiloStatus::Dead => "dead",
            SiloStatus::Suspect => "suspect",
        };
        f.write_str(name)
    }
}

/// One silo's row in the membership table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipEntry {
    pub silo_address: SiloAddress,
    pub status: SiloStatus,
    /// Set only when the silo accepts client connections as a gateway.
    pub proxy_port: Option<u16>,
    pub silo_name: String,
    pub host_name: String,
    pub role_name: String,
    pub update_zone: i32,
    pub fault_zone: i32,
    /// Failure-detector evidence: who suspected this silo and when, oldest first.
    pub suspect_times: Vec<(SiloAddress, DateTime<Utc>)>,
    pub start_time: DateTime<Utc>,
    pub i_am_alive_time: DateTime<Utc>,
}

impl MembershipEntry {
    pub fn new(silo_address: SiloAddress, status: SiloStatus, start_time: DateTime<Utc>) -> Self {
        Self {
            silo_address,
            status,
            proxy_port: None,
            silo_name: String::new(),
            host_name: String::new(),
            role_name: String::new(),
            update_zone: 0,
            fault_zone: 0,
            suspect_times: Vec::new(),
            start_time,
            i_am_alive_time: start_time,
        }
    }

    pub fn add_suspector(&mut self, suspecting_silo: SiloAddress, time: DateTime<Utc>) {
        self.suspect_times.push((suspecting_silo, time));
    }

    pub fn is_gateway(&self) -> bool {
        self.status == SiloStatus::Active && self.proxy_port.is_some_and(|port| port > 0)
    }

    /// Client-facing endpoint of this silo, if it is an active gateway.
    pub fn gateway_uri(&self) -> Option<GatewayUri> {
        if !self.is_gateway() {
            return None;
        }
        let port = self.proxy_port?;
        Some(GatewayUri::new(&SiloAddress::from_parts(
            self.silo_address.address(),
            port,
            self.silo_address.generation,
        )))
    }
}

/// Optimistic-concurrency token for the whole membership set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableVersion {
    pub version: i64,
    pub etag: String,
}

impl TableVersion {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            etag: String::new(),
        }
    }

    pub fn next(&self) -> Self {
        Self::new(self.version + 1)
    }
}

/// Result of a membership read: entries (with their etags) plus the table version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipTableData {
    pub members: Vec<(MembershipEntry, String)>,
    pub version: TableVersion,
}

impl MembershipTableData {
    pub fn entries(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.members.iter().map(|(entry, _)| entry)
    }

    pub fn find(&self, silo: &SiloAddress) -> Option<&MembershipEntry> {
        self.entries().find(|entry| &entry.silo_address == silo)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Routable address of a gateway: `gwy.tcp://{address}:{proxy_port}/{generation}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GatewayUri(pub String);

impl GatewayUri {
    pub fn new(proxy: &SiloAddress) -> Self {
        Self(format!("gwy.tcp://{}/{}", proxy.endpoint, proxy.generation))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
