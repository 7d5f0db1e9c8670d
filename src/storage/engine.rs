use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::backend::QuorumStore;
use super::error::StoreError;
use super::replication::ReplicaSet;
use super::types::*;

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    value: Value,
    written_at: u64,
}

/// One replica's copy of a row: timestamped cells plus the newest row tombstone.
#[derive(Debug, Clone, Default, PartialEq)]
struct StoredRow {
    cells: BTreeMap<String, Cell>,
    deleted_at: u64,
}

impl StoredRow {
    fn write(&mut self, column: &str, value: Value, written_at: u64) {
        if written_at <= self.deleted_at {
            return;
        }
        match self.cells.get(column) {
            Some(existing) if existing.written_at > written_at => {}
            _ => {
                self.cells
                    .insert(column.to_string(), Cell { value, written_at });
            }
        }
    }

    fn delete(&mut self, deleted_at: u64) {
        self.deleted_at = self.deleted_at.max(deleted_at);
        let cutoff = self.deleted_at;
        self.cells.retain(|_, cell| cell.written_at > cutoff);
    }

    /// Last-write-wins merge per cell; a newer tombstone shadows older cells.
    fn merge(&mut self, other: &StoredRow) {
        self.delete(other.deleted_at);
        for (column, cell) in &other.cells {
            self.write(column, cell.value.clone(), cell.written_at);
        }
    }

    fn materialize(&self) -> Option<Row> {
        let columns: BTreeMap<String, Value> = self
            .cells
            .iter()
            .filter(|(_, cell)| !cell.value.is_null())
            .map(|(column, cell)| (column.clone(), cell.value.clone()))
            .collect();

        if columns.is_empty() {
            None
        } else {
            Some(Row(columns))
        }
    }
}

/// A mutation resolved against the schema, ready to apply without further checks.
enum Write {
    Columns(Vec<(String, Value)>),
    Tombstone,
}

struct Table {
    schema: TableSchema,
    replicas: Vec<DashMap<RowKey, StoredRow>>,
    // Batches take it for writing, selects for reading.
    lock: RwLock<()>,
}

impl Table {
    fn new(schema: TableSchema, replication_factor: usize) -> Self {
        Self {
            schema,
            replicas: (0..replication_factor).map(|_| DashMap::new()).collect(),
            lock: RwLock::new(()),
        }
    }

    fn resolve(&self, mutation: &Mutation) -> Result<(RowKey, Write), StoreError> {
        self.schema.check_mutation(mutation)?;

        match mutation {
            Mutation::Insert { row } => {
                let key = self.schema.key_of(row)?;
                let columns = row
                    .iter()
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                Ok((key, Write::Columns(columns)))
            }
            Mutation::Update { key, values } => {
                let mut columns: Vec<(String, Value)> = self
                    .schema
                    .partition_key
                    .iter()
                    .zip(key.0.iter())
                    .map(|(column, part)| (column.clone(), Value::Text(part.clone())))
                    .collect();
                columns.extend(
                    values
                        .iter()
                        .filter(|(column, _)| !self.schema.is_key_column(column))
                        .map(|(column, value)| (column.clone(), value.clone())),
                );
                Ok((key.clone(), Write::Columns(columns)))
            }
            Mutation::Delete { key } => Ok((key.clone(), Write::Tombstone)),
        }
    }

    fn apply(&self, replica: usize, key: &RowKey, write: &Write, written_at: u64) {
        let mut stored = self.replicas[replica].entry(key.clone()).or_default();
        match write {
            Write::Columns(columns) => {
                for (column, value) in columns {
                    stored.write(column, value.clone(), written_at);
                }
            }
            Write::Tombstone => stored.delete(written_at),
        }
    }

    /// Merges the contacted replicas' copies of one row and repairs the stale ones.
    fn read_key(&self, readers: &[usize], key: &RowKey) -> Option<Row> {
        let mut merged: Option<StoredRow> = None;
        for &replica in readers {
            if let Some(copy) = self.replicas[replica].get(key) {
                match merged.as_mut() {
                    Some(row) => row.merge(copy.value()),
                    None => merged = Some(copy.value().clone()),
                }
            }
        }

        let merged = merged?;
        for &replica in readers {
            let stale = self.replicas[replica]
                .get(key)
                .map(|copy| copy.value() != &merged)
                .unwrap_or(true);
            if stale {
                tracing::debug!("Read repair of {:?} on replica {}", key, replica);
                self.replicas[replica].insert(key.clone(), merged.clone());
            }
        }

        merged.materialize()
    }

    fn scan(&self, readers: &[usize], filters: &[Filter]) -> Vec<Row> {
        let mut keys = BTreeSet::new();
        for &replica in readers {
            for entry in self.replicas[replica].iter() {
                keys.insert(entry.key().clone());
            }
        }

        keys.iter()
            .filter_map(|key| self.read_key(readers, key))
            .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            .collect()
    }
}

struct Keyspace {
    replicas: ReplicaSet,
    tables: DashMap<String, Arc<Table>>,
}

/// Embedded replicated wide-column store.
///
/// Each keyspace keeps `replication_factor` copies of every table. Writes reach every
/// available replica, reads merge as many replicas as the consistency level requires,
/// and cells are reconciled by a store-wide write clock (last write wins). Batches are
/// serialized per table, so a batch is observed either completely or not at all.
pub struct ColumnStore {
    keyspaces: DashMap<String, Arc<Keyspace>>,
    clock: AtomicU64,
}

impl ColumnStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn keyspace(&self, keyspace: &str) -> Result<Arc<Keyspace>, StoreError> {
        self.keyspaces
            .get(keyspace)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::KeyspaceNotFound(keyspace.to_string()))
    }

    fn table(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<(Arc<Keyspace>, Arc<Table>), StoreError> {
        let ks = self.keyspace(keyspace)?;
        let found = ks
            .tables
            .get(table)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::TableNotFound {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            })?;
        Ok((ks, found))
    }

    fn next_timestamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marks a replica of `keyspace` as reachable or not. Unreachable replicas miss
    /// writes and are skipped by reads until they come back.
    pub fn set_replica_available(
        &self,
        keyspace: &str,
        replica: usize,
        available: bool,
    ) -> Result<(), StoreError> {
        let ks = self.keyspace(keyspace)?;
        ks.replicas.set_available(replica, available)?;
        tracing::info!(
            "Replica {} of keyspace {} is now {}",
            replica,
            keyspace,
            if available { "up" } else { "down" }
        );
        Ok(())
    }

    pub fn keyspace_count(&self) -> usize {
        self.keyspaces.len()
    }

    pub fn replication_factor(&self, keyspace: &str) -> Result<usize, StoreError> {
        Ok(self.keyspace(keyspace)?.replicas.replication_factor())
    }

    /// Number of rows (including tombstoned ones) a single replica holds for a table.
    pub fn replica_row_count(
        &self,
        keyspace: &str,
        table: &str,
        replica: usize,
    ) -> Result<usize, StoreError> {
        let (_, table) = self.table(keyspace, table)?;
        table
            .replicas
            .get(replica)
            .map(|rows| rows.len())
            .ok_or_else(|| StoreError::InvalidQuery(format!("replica {} out of range", replica)))
    }
}

impl Default for ColumnStore {
    fn default() -> Self {
        Self {
            keyspaces: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl QuorumStore for ColumnStore {
    async fn create_keyspace(
        &self,
        keyspace: &str,
        replication_factor: usize,
    ) -> Result<(), StoreError> {
        if keyspace.is_empty() {
            return Err(StoreError::InvalidQuery("keyspace name is empty".to_string()));
        }
        if replication_factor == 0 {
            return Err(StoreError::InvalidQuery(
                "replication factor must be at least 1".to_string(),
            ));
        }

        self.keyspaces.entry(keyspace.to_string()).or_insert_with(|| {
            tracing::info!(
                "Created keyspace {} with replication factor {}",
                keyspace,
                replication_factor
            );
            Arc::new(Keyspace {
                replicas: ReplicaSet::new(replication_factor),
                tables: DashMap::new(),
            })
        });

        Ok(())
    }

    async fn create_table(&self, keyspace: &str, schema: &TableSchema) -> Result<(), StoreError> {
        schema.validate()?;
        let ks = self.keyspace(keyspace)?;
        let replication_factor = ks.replicas.replication_factor();

        let existing = ks
            .tables
            .entry(schema.name.clone())
            .or_insert_with(|| {
                tracing::info!("Created table {}.{}", keyspace, schema.name);
                Arc::new(Table::new(schema.clone(), replication_factor))
            })
            .value()
            .clone();

        if &existing.schema != schema {
            return Err(StoreError::InvalidQuery(format!(
                "table {}.{} already exists with a different schema",
                keyspace, schema.name
            )));
        }

        Ok(())
    }

    async fn select(
        &self,
        keyspace: &str,
        table: &str,
        filters: &[Filter],
        consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError> {
        let (ks, table) = self.table(keyspace, table)?;
        for filter in filters {
            table.schema.check_filter(filter)?;
        }
        let readers = ks.replicas.read_targets(consistency)?;

        let _guard = table.lock.read().await;
        Ok(table.scan(&readers, filters))
    }

    async fn execute_batch(
        &self,
        keyspace: &str,
        table: &str,
        batch: Batch,
        consistency: Consistency,
    ) -> Result<BatchOutcome, StoreError> {
        let (ks, table) = self.table(keyspace, table)?;

        let writes = batch
            .mutations
            .iter()
            .map(|mutation| table.resolve(mutation))
            .collect::<Result<Vec<_>, _>>()?;
        for condition in &batch.conditions {
            table.schema.check_key(condition.key())?;
        }

        let targets = ks.replicas.write_targets(consistency)?;
        let _guard = table.lock.write().await;

        if batch.is_conditional() {
            let readers = ks.replicas.read_targets(consistency)?;
            for condition in &batch.conditions {
                let current = table.read_key(&readers, condition.key());
                if !condition.holds(current.as_ref()) {
                    tracing::debug!(
                        "Batch on {}.{} rejected: {:?} does not hold",
                        keyspace,
                        table.schema.name,
                        condition
                    );
                    return Ok(BatchOutcome::Rejected);
                }
            }
        }

        let written_at = self.next_timestamp();
        for &replica in &targets {
            for (key, write) in &writes {
                table.apply(replica, key, write, written_at);
            }
        }

        tracing::debug!(
            "Applied batch of {} mutation(s) to {}.{} on {} replica(s)",
            writes.len(),
            keyspace,
            table.schema.name,
            targets.len()
        );

        Ok(BatchOutcome::Applied)
    }
}
