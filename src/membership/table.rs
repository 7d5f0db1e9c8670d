use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::codec::{self, CLUSTER_VERSION_ID, columns};
use super::error::MembershipError;
use super::store::MembershipStore;
use super::types::{MembershipEntry, MembershipTableData, SiloAddress, TableVersion};
use crate::config::{ClusteringOptions, VersionCheck};
use crate::storage::QuorumStore;
use crate::storage::types::{Batch, BatchOutcome, Condition, Row, Value};

/// The membership table of one cluster.
///
/// Inserts and updates write the silo row together with the next cluster version in a
/// single batch. With [`VersionCheck::Conditional`] the batch only applies while the
/// stored version still equals the caller's expected version, so a stale writer gets
/// `Ok(false)` and must re-read before retrying.
pub struct MembershipTable {
    cluster_id: String,
    options: ClusteringOptions,
    backend: Option<Arc<dyn QuorumStore>>,
    store: OnceCell<MembershipStore>,
}

impl MembershipTable {
    /// A table that connects to `options.contact_points` on [`initialize`](Self::initialize).
    pub fn new(cluster_id: &str, options: ClusteringOptions) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            options,
            backend: None,
            store: OnceCell::new(),
        }
    }

    /// A table over an already connected store.
    pub fn with_backend(
        cluster_id: &str,
        options: ClusteringOptions,
        backend: Arc<dyn QuorumStore>,
    ) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new(cluster_id, options)
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    fn store(&self) -> Result<&MembershipStore, MembershipError> {
        self.store.get().ok_or(MembershipError::NotInitialized)
    }

    /// Connects, creates the table if needed and, with `try_init_table_version`, seeds
    /// the version row. Failures are logged and returned; there is no retry here.
    pub async fn initialize(&self, try_init_table_version: bool) -> Result<(), MembershipError> {
        self.try_initialize(try_init_table_version)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    "Store error occurred while initializing membership table for cluster {}: {}",
                    self.cluster_id,
                    e
                )
            })
    }

    async fn try_initialize(&self, try_init_table_version: bool) -> Result<(), MembershipError> {
        let store = self
            .store
            .get_or_try_init(|| MembershipStore::open(self.backend.clone(), &self.options))
            .await?;
        store
            .bootstrap(&self.cluster_id, try_init_table_version)
            .await?;

        tracing::info!(
            "Membership table {}.{} ready for cluster {}",
            self.options.keyspace,
            self.options.table_name,
            self.cluster_id
        );
        Ok(())
    }

    /// Reads one silo's row together with the table version in a single query.
    pub async fn read_row(
        &self,
        silo: &SiloAddress,
    ) -> Result<MembershipTableData, MembershipError> {
        let store = self.store()?;
        let entity_id = silo.entity_id();

        let result = match store
            .get(&self.cluster_id, &[entity_id.as_str(), CLUSTER_VERSION_ID])
            .await
        {
            Ok(rows) => self.to_table_data(rows),
            Err(e) => Err(e.into()),
        };

        result.inspect_err(|e| {
            tracing::error!(
                "Unexpected error occurred while reading data for silo {} in cluster {}: {}",
                silo,
                self.cluster_id,
                e
            )
        })
    }

    /// Reads every silo row of the cluster plus the table version.
    pub async fn read_all(&self) -> Result<MembershipTableData, MembershipError> {
        let store = self.store()?;

        let result = match store.get_all(&self.cluster_id).await {
            Ok(rows) => self.to_table_data(rows),
            Err(e) => Err(e.into()),
        };

        result.inspect_err(|e| {
            tracing::error!(
                "Unexpected error occurred while reading all membership data of cluster {}: {}",
                self.cluster_id,
                e
            )
        })
    }

    /// Adds a new silo row and bumps the table version to `expected.version + 1`.
    ///
    /// Returns `Ok(false)` if the version moved on or the row already exists.
    pub async fn insert_row(
        &self,
        entry: &MembershipEntry,
        expected: &TableVersion,
    ) -> Result<bool, MembershipError> {
        let entry_key = self.entry_key(entry);
        let mut batch = Batch::new()
            .insert(codec::entry_to_row(entry, &self.cluster_id))
            .update(self.version_key(), self.version_values(&expected.next()));

        if self.options.version_check == VersionCheck::Conditional {
            batch = batch
                .when(Condition::NotExists { key: entry_key })
                .when(self.version_matches(expected));
        }

        self.submit("Insert", entry, expected, batch).await
    }

    /// Rewrites an existing silo row and bumps the table version to `expected.version + 1`.
    ///
    /// Returns `Ok(false)` if the version moved on or the row does not exist.
    pub async fn update_row(
        &self,
        entry: &MembershipEntry,
        expected: &TableVersion,
    ) -> Result<bool, MembershipError> {
        let entry_key = self.entry_key(entry);
        let mut batch = Batch::new()
            .update(entry_key.clone(), codec::entry_to_row(entry, &self.cluster_id))
            .update(self.version_key(), self.version_values(&expected.next()));

        if self.options.version_check == VersionCheck::Conditional {
            batch = batch
                .when(Condition::Exists { key: entry_key })
                .when(self.version_matches(expected));
        }

        self.submit("Update", entry, expected, batch).await
    }

    /// Heartbeat: writes only `i_am_alive_time` of the silo's own row.
    ///
    /// Fails with [`MembershipError::RowNotFound`] if the silo has no row; the heartbeat
    /// never creates one.
    pub async fn update_i_am_alive(&self, entry: &MembershipEntry) -> Result<(), MembershipError> {
        let store = self.store()?;
        let entity_id = entry.silo_address.entity_id();

        let outcome = store
            .write_field(
                &self.cluster_id,
                &entity_id,
                columns::I_AM_ALIVE_TIME,
                Value::Timestamp(entry.i_am_alive_time),
            )
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Store error occurred while updating liveness of silo {} in cluster {}: {}",
                    entry.silo_address,
                    self.cluster_id,
                    e
                );
                MembershipError::from(e)
            })?;

        match outcome {
            BatchOutcome::Applied => Ok(()),
            BatchOutcome::Rejected => {
                tracing::warn!(
                    "Liveness update of silo {} ignored: cluster {} has no row for it",
                    entry.silo_address,
                    self.cluster_id
                );
                Err(MembershipError::RowNotFound(entity_id))
            }
        }
    }

    /// Deletes every row of `cluster_id`, version row included, in one batch.
    pub async fn delete_membership_table_entries(
        &self,
        cluster_id: &str,
    ) -> Result<(), MembershipError> {
        let store = self.store()?;
        let warn = |e: &crate::storage::StoreError| {
            tracing::warn!(
                "Store error occurred while deleting membership entries of cluster {}: {}",
                cluster_id,
                e
            )
        };

        let rows = store.get_all(cluster_id).await.inspect_err(warn)?;

        let mut batch = Batch::new();
        for row in &rows {
            if let Some(Value::Text(entity_id)) = row.get(columns::ENTITY_ID) {
                batch = batch.delete(store.key(cluster_id, entity_id));
            }
        }

        if batch.mutations.is_empty() {
            tracing::debug!("No membership entries to delete for cluster {}", cluster_id);
            return Ok(());
        }

        let deleted = batch.mutations.len();
        store.batch_write(batch).await.inspect_err(warn)?;
        tracing::info!(
            "Deleted {} membership row(s) of cluster {}",
            deleted,
            cluster_id
        );

        Ok(())
    }

    /// Rows are only ever removed cluster-wide by
    /// [`delete_membership_table_entries`](Self::delete_membership_table_entries).
    pub async fn cleanup_defunct_silo_entries(
        &self,
        before: DateTime<Utc>,
    ) -> Result<(), MembershipError> {
        tracing::warn!(
            "Cleanup of silo entries older than {} is not supported (cluster {})",
            before,
            self.cluster_id
        );
        Err(MembershipError::NotSupported("cleanup_defunct_silo_entries"))
    }

    fn entry_key(&self, entry: &MembershipEntry) -> crate::storage::types::RowKey {
        codec::row_key(&self.cluster_id, &entry.silo_address.entity_id())
    }

    fn version_key(&self) -> crate::storage::types::RowKey {
        codec::row_key(&self.cluster_id, CLUSTER_VERSION_ID)
    }

    fn version_values(&self, next: &TableVersion) -> Row {
        codec::version_to_row(next, &self.cluster_id, Utc::now())
    }

    fn version_matches(&self, expected: &TableVersion) -> Condition {
        Condition::ColumnEquals {
            key: self.version_key(),
            column: columns::VERSION.to_string(),
            value: Value::Int(expected.version),
        }
    }

    async fn submit(
        &self,
        operation: &str,
        entry: &MembershipEntry,
        expected: &TableVersion,
        batch: Batch,
    ) -> Result<bool, MembershipError> {
        let store = self.store()?;

        match store.batch_write(batch).await {
            Ok(BatchOutcome::Applied) => {
                tracing::debug!(
                    "{} of silo {} ({}) applied, table version {} -> {}",
                    operation,
                    entry.silo_address,
                    entry.status,
                    expected.version,
                    expected.version + 1
                );
                Ok(true)
            }
            Ok(BatchOutcome::Rejected) => {
                tracing::info!(
                    "{} of silo {} rejected: version is no longer {} or the row check failed",
                    operation,
                    entry.silo_address,
                    expected.version
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    "Store error occurred during {} of silo {} in cluster {}: {}",
                    operation.to_lowercase(),
                    entry.silo_address,
                    self.cluster_id,
                    e
                );
                Err(e.into())
            }
        }
    }

    fn to_table_data(&self, rows: Vec<Row>) -> Result<MembershipTableData, MembershipError> {
        let mut version = None;
        let mut members = Vec::with_capacity(rows.len());

        for row in &rows {
            if codec::is_version_row(row) {
                version = Some(codec::row_to_version(row)?);
            } else {
                members.push((codec::row_to_entry(row)?, String::new()));
            }
        }

        let version =
            version.ok_or_else(|| MembershipError::MissingVersion(self.cluster_id.clone()))?;

        Ok(MembershipTableData { members, version })
    }
}
