use async_trait::async_trait;

use super::error::StoreError;
use super::types::{Batch, BatchOutcome, Consistency, Filter, Row, TableSchema};

/// The operations the membership layer needs from a replicated column store.
///
/// Implemented by the embedded [`ColumnStore`](super::engine::ColumnStore) and by the
/// HTTP [`RemoteStore`](super::client::RemoteStore). Handles are shared as
/// `Arc<dyn QuorumStore>` and must be safe to call concurrently.
#[async_trait]
pub trait QuorumStore: Send + Sync {
    /// Creates the keyspace if absent. An existing keyspace keeps its replication factor.
    async fn create_keyspace(
        &self,
        keyspace: &str,
        replication_factor: usize,
    ) -> Result<(), StoreError>;

    /// Creates the table if absent. Fails if a table with a different schema exists.
    async fn create_table(&self, keyspace: &str, schema: &TableSchema) -> Result<(), StoreError>;

    /// Returns every row of the table matching all `filters`.
    async fn select(
        &self,
        keyspace: &str,
        table: &str,
        filters: &[Filter],
        consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError>;

    /// Applies the batch atomically: all mutations become visible together or none do.
    async fn execute_batch(
        &self,
        keyspace: &str,
        table: &str,
        batch: Batch,
        consistency: Consistency,
    ) -> Result<BatchOutcome, StoreError>;
}
