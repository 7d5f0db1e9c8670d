//! Runtime configuration.
//!
//! Every component receives its options at construction; nothing here is global.
//! [`Settings`] aggregates all sections and can be loaded from a TOML file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How inserts and updates guard the cluster version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionCheck {
    /// The batch applies only if the stored version equals the caller's expected version.
    Conditional,
    /// The batch overwrites the version row unconditionally. Concurrent writers can
    /// both succeed; kept for compatibility with tables written that way.
    Unconditional,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsOptions {
    /// Log every statement issued against the store, with its latency, at debug level.
    pub trace_statements: bool,
}

/// Options of the membership table and gateway list provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringOptions {
    /// Store node to connect to, as `host:port` or `http://host:port`. At most one:
    /// store nodes do not replicate to each other.
    pub contact_points: Vec<String>,
    pub keyspace: String,
    pub table_name: String,
    pub replication_factor: usize,
    pub version_check: VersionCheck,
    /// Per-request timeout of the remote store client.
    pub request_timeout_ms: u64,
    /// Attempts per request before the remote store client gives up.
    pub request_attempts: usize,
    pub diagnostics: DiagnosticsOptions,
}

impl Default for ClusteringOptions {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            keyspace: "orleans".to_string(),
            table_name: "cluster_membership".to_string(),
            replication_factor: 3,
            version_check: VersionCheck::Conditional,
            request_timeout_ms: 500,
            request_attempts: 3,
            diagnostics: DiagnosticsOptions::default(),
        }
    }
}

impl ClusteringOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayOptions {
    /// How often callers should refresh the gateway list.
    pub refresh_period_secs: u64,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            refresh_period_secs: 60,
        }
    }
}

impl GatewayOptions {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }
}

/// Bounded retry of the initial store connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub connect_attempts: usize,
    pub connect_delay_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_delay_secs: 4,
        }
    }
}

impl ClientOptions {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cluster_id: String,
    pub clustering: ClusteringOptions,
    pub gateway: GatewayOptions,
    pub client: ClientOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_id: "dev".to_string(),
            clustering: ClusteringOptions::default(),
            gateway: GatewayOptions::default(),
            client: ClientOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(source).context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster_id.is_empty() {
            anyhow::bail!("cluster_id must not be empty");
        }
        if self.clustering.replication_factor == 0 {
            anyhow::bail!("clustering.replication_factor must be at least 1");
        }
        if self.clustering.contact_points.len() > 1 {
            anyhow::bail!(
                "clustering.contact_points lists {} store nodes, at most one is supported",
                self.clustering.contact_points.len()
            );
        }
        if self.clustering.request_attempts == 0 {
            anyhow::bail!("clustering.request_attempts must be at least 1");
        }
        if self.client.connect_attempts == 0 {
            anyhow::bail!("client.connect_attempts must be at least 1");
        }
        Ok(())
    }
}
