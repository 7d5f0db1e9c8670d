use axum::{
    Extension, Router,
    routing::{get, post},
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::backend::QuorumStore;
use super::engine::ColumnStore;
use super::error::StoreError;
use super::handlers::*;
use super::protocol::*;
use super::types::BatchOutcome;

const MAX_REMEMBERED_OPS: usize = 10_000;

/// A store node: the embedded engine exposed to remote clients.
pub struct StoreNode {
    name: String,
    engine: Arc<ColumnStore>,
    // Claimed before the batch runs, so a retry arriving mid-flight waits for the first run.
    processed_ops: DashMap<String, Arc<OnceCell<BatchOutcome>>>,
}

impl StoreNode {
    pub fn new(name: &str, engine: Arc<ColumnStore>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            engine,
            processed_ops: DashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &Arc<ColumnStore> {
        &self.engine
    }

    pub fn keyspace_count(&self) -> usize {
        self.engine.keyspace_count()
    }

    /// Runs a batch once per `op_id`; a repeated `op_id` gets the outcome of the first run,
    /// waiting for it if that run is still in progress. A failed run is not recorded.
    pub async fn execute_batch(&self, req: BatchRequest) -> Result<BatchOutcome, StoreError> {
        let BatchRequest {
            op_id,
            keyspace,
            table,
            batch,
            consistency,
        } = req;

        let existing = self
            .processed_ops
            .get(&op_id)
            .map(|slot| slot.value().clone());
        let slot = match existing {
            Some(slot) => slot,
            None => {
                if self.processed_ops.len() > MAX_REMEMBERED_OPS {
                    self.processed_ops.clear();
                }
                self.processed_ops
                    .entry(op_id.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .value()
                    .clone()
            }
        };

        if let Some(outcome) = slot.get() {
            tracing::debug!("Batch {} already processed, replaying outcome", op_id);
            return Ok(*outcome);
        }

        let outcome = slot
            .get_or_try_init(|| {
                self.engine
                    .execute_batch(&keyspace, &table, batch, consistency)
            })
            .await?;

        Ok(*outcome)
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(ENDPOINT_HEALTH, get(handle_health))
            .route(ENDPOINT_KEYSPACE, post(handle_create_keyspace))
            .route(ENDPOINT_TABLE, post(handle_create_table))
            .route(ENDPOINT_SELECT, post(handle_select))
            .route(ENDPOINT_BATCH, post(handle_batch))
            .layer(Extension(self))
    }
}
