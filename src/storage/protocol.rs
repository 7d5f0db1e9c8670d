//! Store Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) used between a
//! [`RemoteStore`](super::client::RemoteStore) client and a store node.
//!
//! All bodies are JSON. Failures travel back as an [`ErrorResponse`] carrying the
//! original [`StoreError`], so the client can rebuild the exact error.

use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::types::{Batch, BatchOutcome, Consistency, Filter, Row, TableSchema};

// --- API Endpoints ---

/// Liveness probe used when connecting to a contact point.
pub const ENDPOINT_HEALTH: &str = "/store/health";
/// Creates a keyspace if it does not exist.
pub const ENDPOINT_KEYSPACE: &str = "/store/keyspace";
/// Creates a table if it does not exist.
pub const ENDPOINT_TABLE: &str = "/store/table";
/// Filtered read of a table.
pub const ENDPOINT_SELECT: &str = "/store/select";
/// Atomic (optionally conditional) batch write.
pub const ENDPOINT_BATCH: &str = "/store/batch";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node: String,
    pub keyspaces: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyspaceRequest {
    pub keyspace: String,
    pub replication_factor: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub keyspace: String,
    pub schema: TableSchema,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectRequest {
    pub keyspace: String,
    pub table: String,
    pub filters: Vec<Filter>,
    pub consistency: Consistency,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectResponse {
    pub rows: Vec<Row>,
}

/// Batch write request.
///
/// `op_id` identifies the batch across client retries: a node that already executed
/// an `op_id` answers with the recorded outcome instead of running the batch again.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub op_id: String,
    pub keyspace: String,
    pub table: String,
    pub batch: Batch,
    pub consistency: Consistency,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub outcome: BatchOutcome,
}

/// Acknowledgment for schema operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: StoreError,
}
