use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use super::codec::{self, CLUSTER_VERSION_ID, SILO_INSTANCE_TYPE, columns};
use super::error::MembershipError;
use super::types::{SiloStatus, TableVersion};
use crate::config::{ClusteringOptions, DiagnosticsOptions};
use crate::storage::client::RemoteStore;
use crate::storage::{QuorumStore, StoreError};
use crate::storage::types::{
    Batch, BatchOutcome, Condition, Consistency, Filter, Row, RowKey, TableSchema, Value,
};

/// Every statement issued by the membership layer runs at this level.
pub const CONSISTENCY: Consistency = Consistency::EachQuorum;

/// Schema-aware wrapper over the backing store for the membership table.
///
/// Owns the keyspace/table layout and applies [`CONSISTENCY`] to every read and write.
pub struct MembershipStore {
    backend: Arc<dyn QuorumStore>,
    keyspace: String,
    replication_factor: usize,
    schema: TableSchema,
    diagnostics: DiagnosticsOptions,
}

impl MembershipStore {
    pub fn new(backend: Arc<dyn QuorumStore>, options: &ClusteringOptions) -> Self {
        Self {
            backend,
            keyspace: options.keyspace.clone(),
            replication_factor: options.replication_factor,
            schema: codec::membership_schema(&options.table_name),
            diagnostics: options.diagnostics.clone(),
        }
    }

    /// Uses `backend` when given, otherwise connects to the configured contact points.
    pub async fn open(
        backend: Option<Arc<dyn QuorumStore>>,
        options: &ClusteringOptions,
    ) -> Result<Self, StoreError> {
        let backend: Arc<dyn QuorumStore> = match backend {
            Some(backend) => backend,
            None => Arc::new(RemoteStore::connect(options).await?),
        };
        Ok(Self::new(backend, options))
    }

    pub fn key(&self, cluster_id: &str, entity_id: &str) -> RowKey {
        codec::row_key(cluster_id, entity_id)
    }

    fn trace(&self, statement: &str, started: Instant) {
        if self.diagnostics.trace_statements {
            tracing::debug!(
                "{} on {}.{} at {:?} took {:?}",
                statement,
                self.keyspace,
                self.schema.name,
                CONSISTENCY,
                started.elapsed()
            );
        }
    }

    /// Creates keyspace and table if absent and, when asked, seeds the version row at 0.
    ///
    /// The seed is an insert-if-absent, so an existing version row is never reset even
    /// when several silos bootstrap the same cluster at once.
    pub async fn bootstrap(
        &self,
        cluster_id: &str,
        create_version_row: bool,
    ) -> Result<(), MembershipError> {
        let started = Instant::now();
        self.backend
            .create_keyspace(&self.keyspace, self.replication_factor)
            .await?;
        self.backend
            .create_table(&self.keyspace, &self.schema)
            .await?;
        self.trace("CREATE IF NOT EXISTS", started);

        if !create_version_row {
            return Ok(());
        }

        let seed = codec::version_to_row(&TableVersion::new(0), cluster_id, Utc::now());
        let batch = Batch::new().insert(seed).when(Condition::NotExists {
            key: self.key(cluster_id, CLUSTER_VERSION_ID),
        });

        match self.batch_write(batch).await? {
            BatchOutcome::Applied => {
                tracing::info!("Seeded version row for cluster {}", cluster_id)
            }
            BatchOutcome::Rejected => tracing::debug!(
                "Version row for cluster {} already exists, keeping it",
                cluster_id
            ),
        }

        Ok(())
    }

    async fn select(&self, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let started = Instant::now();
        let rows = self
            .backend
            .select(&self.keyspace, &self.schema.name, filters, CONSISTENCY)
            .await;
        self.trace("SELECT", started);
        rows
    }

    /// Rows of `cluster_id` whose entity id is one of `entity_ids`.
    pub async fn get(
        &self,
        cluster_id: &str,
        entity_ids: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        self.select(&[
            Filter::eq(columns::CLUSTER_ID, cluster_id),
            Filter::is_in(columns::ENTITY_ID, entity_ids.iter().copied()),
        ])
        .await
    }

    /// Every row of `cluster_id`, version row included.
    pub async fn get_all(&self, cluster_id: &str) -> Result<Vec<Row>, StoreError> {
        self.select(&[Filter::eq(columns::CLUSTER_ID, cluster_id)])
            .await
    }

    /// Silo rows that are active and expose a proxy port.
    pub async fn get_gateways(&self, cluster_id: &str) -> Result<Vec<Row>, StoreError> {
        self.select(&[
            Filter::eq(columns::CLUSTER_ID, cluster_id),
            Filter::eq(columns::ENTITY_TYPE, SILO_INSTANCE_TYPE),
            Filter::eq(columns::STATUS, SiloStatus::Active.code()),
            Filter::gt(columns::PROXY_PORT, 0i64),
        ])
        .await
    }

    /// Executes the batch as one atomic unit.
    pub async fn batch_write(&self, batch: Batch) -> Result<BatchOutcome, StoreError> {
        let started = Instant::now();
        let statement = format!(
            "BATCH [{}]{}",
            batch
                .mutations
                .iter()
                .map(|mutation| mutation.kind())
                .collect::<Vec<_>>()
                .join(", "),
            if batch.is_conditional() { " IF ..." } else { "" }
        );
        let outcome = self
            .backend
            .execute_batch(&self.keyspace, &self.schema.name, batch, CONSISTENCY)
            .await;
        self.trace(&statement, started);
        outcome
    }

    /// Overwrites a single column of an existing row without touching the others.
    ///
    /// `Rejected` if the row does not exist; a missing row is never created.
    pub async fn write_field(
        &self,
        cluster_id: &str,
        entity_id: &str,
        column: &str,
        value: Value,
    ) -> Result<BatchOutcome, StoreError> {
        let key = self.key(cluster_id, entity_id);
        let batch = Batch::new()
            .update(key.clone(), Row::new().with(column, value))
            .when(Condition::Exists { key });
        self.batch_write(batch).await
    }
}
